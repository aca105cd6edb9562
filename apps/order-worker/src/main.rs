//! Order Worker Service - Entry Point
//!
//! Background worker that consumes order events and audit batches from SQS.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    order_worker::run().await
}
