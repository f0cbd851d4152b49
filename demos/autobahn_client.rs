//! Drives the Autobahn Testsuite fuzzing client against a local
//! `wstest` server: fetches the case count, replays every case through
//! an echo loop, then asks the server to write out its reports. Run with
//! `permessage-deflate` forced on so the compressed code paths get
//! exercised too.

use fluxsocket::client;
use fluxsocket::config::{ClientConfig, PerMessageDeflateConfig};
use fluxsocket::error::Error;
use fluxsocket::message::MessageType;
use log::*;

const AGENT: &str = "fluxsocket";

fn get_config() -> ClientConfig {
    ClientConfig {
        websocket_config: fluxsocket::config::WebSocketConfig {
            per_message_deflate: PerMessageDeflateConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn run_test(case: u32) -> Result<(), Error> {
    let config = get_config();

    info!("running test case {}", case);
    let case_url = format!("ws://127.0.0.1:9001/runCase?case={}&agent={}", case, AGENT);
    let mut connection = client::connect(&case_url, &config).await?;

    let mut buf = vec![0u8; 16 << 20];
    loop {
        let received = connection.receive(&mut buf).await?;
        if received.message_type == MessageType::Close {
            break;
        }
        connection
            .send(&buf[..received.bytes], received.message_type, received.end_of_message)
            .await?;
    }

    Ok(())
}

async fn update_reports() -> Result<(), Error> {
    let config = get_config();

    info!("updating reports");
    let url = format!("ws://127.0.0.1:9001/updateReports?agent={}", AGENT);
    let mut connection = client::connect(&url, &config).await?;
    info!("closing connection");
    connection
        .close(fluxsocket::error::CloseStatus::NormalClosure, "done")
        .await?;
    Ok(())
}

async fn get_case_count() -> Result<u32, Error> {
    let config = get_config();

    let mut connection = client::connect("ws://127.0.0.1:9001/getCaseCount", &config).await?;

    let mut buf = vec![0u8; 4096];
    let received = connection.receive(&mut buf).await?;
    let text = String::from_utf8(buf[..received.bytes].to_vec())?;
    let count = text.parse::<u32>().expect("couldn't convert test case count to a number");

    connection
        .close(fluxsocket::error::CloseStatus::NormalClosure, "done")
        .await?;
    Ok(count)
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let total = get_case_count().await.expect("error getting case count");

    for case in 1..=total {
        if let Err(e) = run_test(case).await {
            error!("testcase {} failed: {}", case, e)
        }
    }

    update_reports().await.expect("error updating reports");
}
