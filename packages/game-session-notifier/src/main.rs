use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::info;

mod activity;
mod processor;

use processor::SessionActivityProcessor;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    info!("Game session notifier starting");

    let processor = SessionActivityProcessor::new();

    run(service_fn(
        move |event: LambdaEvent<aws_lambda_events::event::dynamodb::Event>| {
            let processor = processor.clone();
            async move { processor.process_event(event.payload).await }
        },
    ))
    .await
}
