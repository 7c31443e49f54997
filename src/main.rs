#![deny(warnings)]

mod agent;
mod api;
mod config;
mod cron_ext;
mod database;
mod error;
mod http_client;
mod ingress;
mod queue;
mod redis;
mod scheduler;
mod server;
mod smtp;
mod tasks;
mod whitelist;
mod worker;

use crate::config::RawConfig;
use anyhow::anyhow;
use clap::{crate_authors, crate_description, crate_version, value_parser, Arg, Command};
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    if env::var("RUST_LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().json().flatten_event(true).init();
    } else {
        tracing_subscriber::fmt::init();
    }

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install default RusTLS crypto provider.");

    let matches = Command::new("taskmail")
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .arg(
            Arg::new("CONFIG")
                .env("TASKMAIL_CONFIG")
                .short('c')
                .long("config")
                .default_value("taskmail.toml")
                .help("Path to the taskmail configuration file."),
        )
        .arg(
            Arg::new("PORT")
                .env("TASKMAIL_PORT")
                .short('p')
                .long("port")
                .value_parser(value_parser!(u16))
                .help("Defines a TCP port to listen on."),
        )
        .get_matches();

    let mut raw_config = RawConfig::read_from_file(
        matches
            .get_one::<String>("CONFIG")
            .ok_or_else(|| anyhow!("<CONFIG> argument is not provided."))?,
    )?;

    if let Some(port) = matches.get_one::<u16>("PORT") {
        raw_config.port = *port;
    }

    info!(config = ?raw_config, "taskmail raw configuration.");

    server::run(raw_config).await
}
