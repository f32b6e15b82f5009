use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardColor {
    Red,
    Green,
    Blue,
    Yellow,
    Wild,
}

impl CardColor {
    pub const PLAYABLE: [CardColor; 4] = [
        CardColor::Red,
        CardColor::Green,
        CardColor::Blue,
        CardColor::Yellow,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CardValue {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "SKIP")]
    Skip,
    #[serde(rename = "REVERSE")]
    Reverse,
    #[serde(rename = "DRAW_2")]
    DrawTwo,
    #[serde(rename = "WILD")]
    Wild,
    #[serde(rename = "WILD_DRAW_4")]
    WildDrawFour,
}

impl CardValue {
    /// The values printed on coloured cards, in deck order.
    pub const COLORED: [CardValue; 13] = [
        CardValue::Zero,
        CardValue::One,
        CardValue::Two,
        CardValue::Three,
        CardValue::Four,
        CardValue::Five,
        CardValue::Six,
        CardValue::Seven,
        CardValue::Eight,
        CardValue::Nine,
        CardValue::Skip,
        CardValue::Reverse,
        CardValue::DrawTwo,
    ];

    pub const WILD: [CardValue; 2] = [CardValue::Wild, CardValue::WildDrawFour];
}

impl fmt::Display for CardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CardValue::Zero => "0",
            CardValue::One => "1",
            CardValue::Two => "2",
            CardValue::Three => "3",
            CardValue::Four => "4",
            CardValue::Five => "5",
            CardValue::Six => "6",
            CardValue::Seven => "7",
            CardValue::Eight => "8",
            CardValue::Nine => "9",
            CardValue::Skip => "SKIP",
            CardValue::Reverse => "REVERSE",
            CardValue::DrawTwo => "DRAW 2",
            CardValue::Wild => "WILD",
            CardValue::WildDrawFour => "WILD DRAW 4",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Card {
    pub color: CardColor,
    pub value: CardValue,
}

impl Card {
    pub fn new(color: CardColor, value: CardValue) -> Self {
        Card { color, value }
    }

    pub fn is_wild(&self) -> bool {
        self.color == CardColor::Wild
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.color, self.value)
    }
}

/// `gameState` of an Uno session. Piles keep their top card at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnoGameState {
    pub turn: usize,
    /// `1` for seat order, `-1` after an odd number of reverses.
    pub direction: i8,
    pub current_color: Option<CardColor>,
    #[serde(default)]
    pub draw_pile: Vec<Card>,
    #[serde(default)]
    pub discard_pile: Vec<Card>,
    #[serde(default)]
    pub player_hands: BTreeMap<String, Vec<Card>>,
    pub winner: Option<String>,
}

impl Default for UnoGameState {
    fn default() -> Self {
        UnoGameState {
            turn: 0,
            direction: 1,
            current_color: None,
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            player_hands: BTreeMap::new(),
            winner: None,
        }
    }
}

impl UnoGameState {
    pub fn top_discard(&self) -> Option<&Card> {
        self.discard_pile.last()
    }

    pub fn hand(&self, user_id: &str) -> &[Card] {
        self.player_hands
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn card_count(&self) -> usize {
        self.draw_pile.len()
            + self.discard_pile.len()
            + self.player_hands.values().map(Vec::len).sum::<usize>()
    }
}
