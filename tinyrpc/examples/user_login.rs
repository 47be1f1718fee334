//! Login example: a `User.Login` method with success and failure paths.
//!
//! ```bash
//! RUST_LOG=info cargo run --example user_login
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
struct LoginRequest {
    name: String,
    pwd: String,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct LoginResponse {
    uid: u64,
    errcode: u32,
}

fn login(req: LoginRequest, done: RpcDone<LoginResponse>) {
    // Illustrative business logic only
    if req.name == "zhangsan" && req.pwd == "123456" {
        done.reply(LoginResponse { uid: 1, errcode: 0 });
    } else {
        done.reply(LoginResponse { uid: 0, errcode: 1 });
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let discovery = MemoryDiscovery::new();

    let provider = RpcProvider::new(PACKAGE, Arc::new(discovery.session()))?;
    provider.register_service(ServiceBuilder::new("User").method("Login", login).build())?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    tokio::spawn(async move {
        if let Err(e) = provider.serve(listener).await {
            eprintln!("provider stopped: {e}");
        }
    });

    let probe = discovery.session();
    probe.start(Duration::from_secs(1))?;
    while probe.get_node_data("/meha/User/Login").is_err() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let session = Arc::new(discovery.session());
    tokio::task::spawn_blocking(move || {
        let mut channel = RpcChannel::new(PACKAGE, session);

        for (name, pwd) in [("zhangsan", "123456"), ("zhangsan", "wrongpass")] {
            let mut response = LoginResponse::default();
            let mut controller = RpcController::new();
            channel.call(
                "User",
                "Login",
                &LoginRequest {
                    name: name.to_string(),
                    pwd: pwd.to_string(),
                },
                &mut response,
                &mut controller,
            );

            if controller.failed() {
                eprintln!("login call failed: {}", controller.error_text());
            } else {
                println!(
                    "login {name}/{pwd} -> uid={} errcode={}",
                    response.uid, response.errcode
                );
            }
        }
    })
    .await?;

    Ok(())
}
