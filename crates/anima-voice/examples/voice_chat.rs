//! Voice Chat Demo — push-to-talk against a live conversation backend.
//!
//! Connects to `ANIMA_BACKEND_URL` (default ws://localhost:3000), announces
//! `ANIMA_CHAT_ID` / `ANIMA_VOICE_ID`, then drives push-to-talk from stdin:
//! press Enter to start recording, Enter again to send the utterance.
//! Synthesized replies play through the default output device; remote
//! expression changes are printed as they arrive.

use anima_voice::{SessionConfig, SessionState, VoiceSession};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SessionConfig::from_env();
    info!("Voice Chat Demo — backend {}", config.channel.url);
    info!("Enter toggles push-to-talk; Ctrl+C (or 'q' + Enter) quits.\n");

    let mut session = VoiceSession::new(config);
    let mut expressions = session
        .take_expression_receiver()
        .expect("expression receiver available before start");
    session.start()?;

    tokio::spawn(async move {
        while let Some(name) = expressions.recv().await {
            info!("Avatar expression: {}", name);
        }
    });

    let stdin = std::io::stdin();
    loop {
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 || line.trim() == "q" {
            break;
        }
        match session.status() {
            SessionState::Streaming => {
                if session.is_recording() {
                    session.release()?;
                    info!("Utterance sent; waiting for reply...");
                } else if session.press() {
                    info!("Recording — press Enter to send");
                }
            }
            SessionState::Connecting => info!("Still connecting, hang on..."),
            SessionState::Error => {
                warn!(
                    "Session error: {}",
                    session.last_error().unwrap_or_else(|| "unknown".to_string())
                );
                break;
            }
            SessionState::Idle => {
                info!("Session idle; restarting");
                session.start()?;
            }
        }
    }

    session.stop();
    Ok(())
}
