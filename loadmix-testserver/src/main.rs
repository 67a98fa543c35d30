use std::net::SocketAddr;
use std::time::Duration;

use loadmix_testserver::{Mode, TestServerStats, TestServerUrls};
use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let stats = TestServerStats::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--latency-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--latency-ms requires a number"))?;
                stats.set_latency(Duration::from_millis(ms.parse()?));
            }
            "--mode" => {
                let mode = args.next().ok_or_else(|| {
                    anyhow::anyhow!(
                        "--mode requires one of healthy, server-error, malformed, missing-fields"
                    )
                })?;
                stats.set_mode(mode.parse::<Mode>().map_err(anyhow::Error::msg)?);
            }
            "-h" | "--help" => {
                eprintln!(
                    "loadmix-testserver\n\nUSAGE:\n  loadmix-testserver [--bind 127.0.0.1:0] [--latency-ms N] [--mode healthy|server-error|malformed|missing-fields]\n\nOUTPUT:\n  Prints BASE_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    let app = loadmix_testserver::router(stats);

    println!(
        "BASE_URL={}",
        TestServerUrls::new(&format!("http://{addr}")).base_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
