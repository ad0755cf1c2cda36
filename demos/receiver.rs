//! Runs both responders of an audio sink until Enter is pressed.
//!
//! Run with:
//!
//! cargo run --example receiver [receiver_id] [options]
//!
//! Example:
//!
//! cargo run --example receiver living-room
//!
//! Options:
//! "--settings-port <port>": answer settings queries on this port instead of 15353.
//! "--discover": look up the audio hub first and print its menu URL.
//!
//! To see the debug log, set the RUST_LOG environment variable:
//!
//! RUST_LOG=audiosink_discovery=debug cargo run --example receiver living-room

use audiosink_discovery::{
    discover_advertised_url, AudioSettings, ReceiverIdentity, SettingsServer,
    SettingsServerConfig, ZeroconfConfig, ZeroconfResponder, SETTINGS_PORT,
};
use std::{env, io};

fn main() {
    // Simple command line options.
    let args: Vec<String> = env::args().collect();
    let mut receiver_id = "receiver-demo".to_string();
    let mut settings_port = SETTINGS_PORT;
    let mut discover = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--discover" => discover = true,
            "--settings-port" => {
                i += 1;
                settings_port = match args.get(i).and_then(|p| p.parse().ok()) {
                    Some(port) => port,
                    None => {
                        print_usage();
                        return;
                    }
                };
            }
            arg if arg.starts_with("--") => {
                print_usage();
                return;
            }
            arg => receiver_id = arg.to_string(),
        }
        i += 1;
    }

    // setup env_logger with more precise timestamp.
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    if discover {
        match discover_advertised_url() {
            Some(url) => println!("Audio hub menu: {}", url),
            None => println!("Audio hub not found"),
        }
    }

    let identity = ReceiverIdentity::new();
    identity.set(&receiver_id);

    let responder = ZeroconfResponder::new(ZeroconfConfig::default(), identity.clone());
    if let Err(e) = responder.start() {
        println!("Failed to start the mDNS responder: {}", e);
        return;
    }

    let config = SettingsServerConfig::default().with_port(settings_port);
    let server = SettingsServer::new(config, identity, || {
        Some(AudioSettings::new(24, 96000, 2, "stereo"))
    });
    if let Err(e) = server.start() {
        println!("Failed to start the settings server: {}", e);
        responder.stop();
        return;
    }

    println!(
        "Advertising receiver '{}', settings on port {}. Press Enter to stop.",
        receiver_id, settings_port
    );
    let mut line = String::new();
    if let Err(e) = io::stdin().read_line(&mut line) {
        println!("stdin: {}", e);
    }

    if let Ok(metrics) = responder.get_metrics() {
        println!("mDNS metrics: {:?}", metrics.recv());
    }
    if let Ok(metrics) = server.get_metrics() {
        println!("settings metrics: {:?}", metrics.recv());
    }

    server.stop();
    responder.stop();
}

fn print_usage() {
    println!("Usage: cargo run --example receiver [receiver_id] [--settings-port <port>] [--discover]");
}
