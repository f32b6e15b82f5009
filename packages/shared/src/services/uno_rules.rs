//! Uno rule engine. Pure functions over explicit state; no I/O.

use rand::Rng;
use std::collections::BTreeMap;

use crate::models::uno::{Card, CardColor, CardValue, UnoGameState};

pub const DECK_SIZE: usize = 108;
pub const HAND_SIZE: usize = 7;
pub const MIN_PLAYERS: usize = 2;

/// Builds the 108-card deck: per colour one `0` and two of every other
/// value, then four of each wild.
pub fn create_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for color in CardColor::PLAYABLE {
        for value in CardValue::COLORED {
            deck.push(Card::new(color, value));
            if value != CardValue::Zero {
                deck.push(Card::new(color, value));
            }
        }
    }
    for value in CardValue::WILD {
        for _ in 0..4 {
            deck.push(Card::new(CardColor::Wild, value));
        }
    }
    deck
}

/// Fisher-Yates shuffle.
pub fn shuffle_deck<R: Rng + ?Sized>(mut deck: Vec<Card>, rng: &mut R) -> Vec<Card> {
    for i in (1..deck.len()).rev() {
        let j = rng.gen_range(0..=i);
        deck.swap(i, j);
    }
    deck
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitialDeal {
    pub draw_pile: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub player_hands: BTreeMap<String, Vec<Card>>,
}

/// Shuffles a fresh deck, deals seven cards to each player from the front of
/// the pile in seat order and flips the starting card from the top. A
/// `WILD_DRAW_4` is never the starting card: it goes to the bottom and the
/// next card is flipped.
pub fn deal_initial_hands<R: Rng + ?Sized>(player_ids: &[String], rng: &mut R) -> InitialDeal {
    let mut deck = shuffle_deck(create_deck(), rng);

    let mut player_hands = BTreeMap::new();
    for id in player_ids {
        let take = HAND_SIZE.min(deck.len());
        let hand: Vec<Card> = deck.drain(..take).collect();
        player_hands.insert(id.clone(), hand);
    }

    let mut discard_pile = Vec::with_capacity(1);
    // Bounded so a pile holding nothing but WILD_DRAW_4s cannot cycle forever.
    for _ in 0..deck.len() {
        match deck.pop() {
            Some(card) if card.value == CardValue::WildDrawFour => deck.insert(0, card),
            Some(card) => {
                discard_pile.push(card);
                break;
            }
            None => break,
        }
    }

    InitialDeal {
        draw_pile: deck,
        discard_pile,
        player_hands,
    }
}

/// Colour in play right after `card` opened the discard pile.
pub fn starting_color(card: &Card) -> Option<CardColor> {
    if card.is_wild() {
        None
    } else {
        Some(card.color)
    }
}

/// A card may be played when it is wild, matches the colour in play or
/// matches the value of the top discard.
pub fn is_move_valid(card: &Card, top_discard: &Card, current_color: Option<CardColor>) -> bool {
    card.color == CardColor::Wild
        || Some(card.color) == current_color
        || card.value == top_discard.value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnChange {
    pub turn: usize,
    pub direction: i8,
    pub current_color: Option<CardColor>,
}

/// One step from `turn` in `direction`, wrapping around the table.
pub fn step(turn: usize, direction: i8, player_count: usize) -> usize {
    if player_count == 0 {
        return 0;
    }
    let count = player_count as i64;
    (turn as i64 + i64::from(direction.signum())).rem_euclid(count) as usize
}

/// Applies the turn effect of `played`: REVERSE flips the direction, SKIP
/// jumps one extra seat, and every card then advances one seat. The colour
/// in play becomes the chosen colour for wilds and the card's own otherwise.
/// Forced draws (DRAW_2, WILD_DRAW_4) are not applied here.
pub fn get_next_turn(
    state: &UnoGameState,
    player_count: usize,
    played: &Card,
    wild_color: Option<CardColor>,
) -> TurnChange {
    let mut direction = if state.direction < 0 { -1 } else { 1 };
    let mut turn = state.turn;

    match played.value {
        CardValue::Reverse => direction = -direction,
        CardValue::Skip => turn = step(turn, direction, player_count),
        _ => {}
    }
    turn = step(turn, direction, player_count);

    let current_color = if played.is_wild() {
        wild_color
    } else {
        Some(played.color)
    };

    TurnChange {
        turn,
        direction,
        current_color,
    }
}
