//! Echo example: a provider and a channel in one process.
//!
//! The provider registers an `Echo.Echo` method that returns its input
//! unchanged; the channel resolves it through the in-memory coordination
//! service and performs a blocking round trip.
//!
//! ```bash
//! RUST_LOG=info cargo run --example echo
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tinyrpc::{
    DiscoveryClient, MemoryDiscovery, RpcChannel, RpcController, RpcDone, RpcProvider,
    ServiceBuilder,
};

const PACKAGE: &str = "meha";

#[derive(Serialize, Deserialize, Default, Debug)]
struct EchoRequest {
    msg: String,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct EchoResponse {
    msg: String,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let discovery = MemoryDiscovery::new();

    // Provider side
    let provider = RpcProvider::new(PACKAGE, Arc::new(discovery.session()))?;
    provider.register_service(
        ServiceBuilder::new("Echo")
            .method("Echo", |req: EchoRequest, done: RpcDone<EchoResponse>| {
                done.reply(EchoResponse { msg: req.msg });
            })
            .build(),
    )?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    tokio::spawn(async move {
        if let Err(e) = provider.serve(listener).await {
            eprintln!("provider stopped: {e}");
        }
    });

    // Wait for publication before the client resolves
    let probe = discovery.session();
    probe.start(Duration::from_secs(1))?;
    while probe.get_node_data("/meha/Echo/Echo").is_err() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Caller side: the channel is blocking, so keep it off the runtime
    let session = Arc::new(discovery.session());
    tokio::task::spawn_blocking(move || {
        let mut channel = RpcChannel::new(PACKAGE, session);
        let mut response = EchoResponse::default();
        let mut controller = RpcController::new();

        channel.call(
            "Echo",
            "Echo",
            &EchoRequest {
                msg: "HelloWorld!".to_string(),
            },
            &mut response,
            &mut controller,
        );

        if controller.failed() {
            eprintln!("call failed: {}", controller.error_text());
        } else {
            println!("echoed: {}", response.msg);
        }
    })
    .await?;

    Ok(())
}
