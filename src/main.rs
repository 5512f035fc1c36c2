use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use wechat_bridge::client::Client;
use wechat_bridge::config::BridgeConfig;
use wechat_bridge::store::FileStore;
use wechat_bridge::transport::WsGatewayFactory;

#[derive(Parser, Debug)]
#[command(name = "wechat-bridge", about = "Bridge a WeChat gateway to a typed event stream")]
struct Args {
    /// WebSocket endpoint of the gateway control channel.
    #[arg(long)]
    endpoint: String,

    /// Access token for the gateway.
    #[arg(long)]
    token: String,

    /// Directory for the entity store and session slot.
    #[arg(long, default_value = ".wechat-bridge")]
    store_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let backend = Arc::new(FileStore::new(&args.store_dir).await?);
    let factory = Arc::new(WsGatewayFactory::new(&args.endpoint, &args.token));
    let config = BridgeConfig {
        endpoint: args.endpoint,
        token: args.token,
        store_dir: args.store_dir,
    };
    let client = Client::new(config, factory, backend);

    let mut scans = client.event_bus.scan.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = scans.recv().await {
            if event.qrcode.is_empty() {
                info!("scan status: {:?}", event.status);
            } else {
                info!("scan this QR code to log in: {}", event.qrcode);
            }
        }
    });

    let mut logins = client.event_bus.login.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = logins.recv().await {
            info!("logged in as {}", event.account_alias);
        }
    });

    let mut messages = client.event_bus.message.subscribe();
    {
        let client = client.clone();
        tokio::spawn(async move {
            while let Ok(event) = messages.recv().await {
                match client.message_payload(&event.message_id).await {
                    Ok(payload) => info!(
                        "message {} from {}: {:?}",
                        payload.id, payload.from_account, payload.kind
                    ),
                    Err(e) => error!("message {} not dereferenced: {e}", event.message_id),
                }
            }
        });
    }

    client.connect().await?;
    info!("bridge is up, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    client.stop().await?;
    Ok(())
}
