//! CLI for the panel client
//!
//! Supports environment variables with the XUI_PANEL_ prefix.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;

use xui_panel::logger::{self, LogLevel};
use xui_panel::{
    Limit, MassClientRequest, MassOperationReport, PanelClient, PanelConfig, TrafficLimit,
    TrafficUnit,
};

/// Parse duration string (e.g., "30s", "2m") or plain seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }
    s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
        format!(
            "Invalid duration '{}'. Use formats like '30s', '2m' or plain seconds",
            s
        )
    })
}

/// Parse a traffic quota like "10GB" or "500MB"
fn parse_traffic(s: &str) -> Result<TrafficLimit, String> {
    if s.eq_ignore_ascii_case("unlimited") {
        return Ok(TrafficLimit::Unlimited);
    }
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| format!("Invalid traffic '{}'. Use e.g. '10GB' or 'unlimited'", s))?;
    let (value, unit) = s.split_at(split);
    let value: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid traffic size in '{}'", s))?;
    let unit = TrafficUnit::parse(unit)
        .ok_or_else(|| format!("Invalid traffic unit in '{}'. Use MB, GB or TB", s))?;
    Ok(TrafficLimit::Size { value, unit })
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Resilient client for 3x-ui style proxy panels")]
struct Cli {
    /// Panel base URL (e.g., "http://127.0.0.1:2053")
    #[arg(long, env = "XUI_PANEL_BASE_URL")]
    base_url: String,

    /// Panel login username
    #[arg(long, env = "XUI_PANEL_USERNAME")]
    username: String,

    /// Panel login password
    #[arg(long, env = "XUI_PANEL_PASSWORD")]
    password: String,

    /// Per-call request timeout (e.g., "30s", default: 30s)
    #[arg(long, env = "XUI_PANEL_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    timeout: Duration,

    /// Retries after the first attempt for transient failures (default: 3)
    #[arg(long, env = "XUI_PANEL_RETRY_ATTEMPTS", default_value_t = 3)]
    retry_attempts: u32,

    /// Base delay for retry backoff (e.g., "1s", default: 1s)
    #[arg(long, env = "XUI_PANEL_RETRY_DELAY", default_value = "1s", value_parser = parse_duration)]
    retry_delay: Duration,

    /// Log level: trace, debug, info, warn, error (default: info)
    #[arg(long, env = "XUI_PANEL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify connectivity and credentials
    Check,
    /// List all subscription groups across inbounds
    ListSubs,
    /// Show one subscription group
    GetSub { sub_id: String },
    /// Create one client per target inbound under a shared subscription id
    MassCreate {
        /// Subscription id; generated for the batch when absent
        #[arg(long)]
        sub_id: Option<String>,
        /// Explicit client email; generated per client when absent
        #[arg(long)]
        email: Option<String>,
        /// Concurrent IP limit per client
        #[arg(long)]
        limit_ip: Option<u64>,
        /// Traffic quota, e.g. "10GB" (default: unlimited)
        #[arg(long, value_parser = parse_traffic)]
        traffic: Option<TrafficLimit>,
        /// Expiry timestamp in epoch milliseconds
        #[arg(long)]
        expiry: Option<u64>,
        /// vless flow override
        #[arg(long)]
        flow: Option<String>,
        /// Target inbound ids (default: all inbounds)
        #[arg(long, value_delimiter = ',')]
        inbounds: Option<Vec<i64>>,
    },
    /// Delete every client of a subscription group
    DeleteSub { sub_id: String },
}

fn print_report(operation: &str, report: &MassOperationReport) {
    println!(
        "{}: {} succeeded, {} failed ({} targets)",
        operation,
        report.success,
        report.failed,
        report.results.len()
    );
    for result in &report.results {
        match &result.error {
            None => println!(
                "  ok    inbound {} [{}] {}",
                result.inbound_id, result.protocol, result.remark
            ),
            Some(error) => println!(
                "  FAIL  inbound {} [{}] {}: {}",
                result.inbound_id, result.protocol, result.remark, error
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init_logger(LogLevel::parse(&cli.log_level));

    let config = PanelConfig::new(&cli.base_url, &cli.username, &cli.password)
        .with_timeout(cli.timeout)
        .with_retry(cli.retry_attempts, cli.retry_delay);
    let client = PanelClient::new(config)?;

    match cli.command {
        Command::Check => {
            let reachable = client.check_connection().await;
            let auth = client.auth_status().await;
            let breaker = client.circuit_breaker_status();
            println!("reachable: {}", reachable);
            println!("authenticated: {}", auth.authenticated);
            println!("circuit breaker: {}", breaker.state);
            if !reachable {
                return Err(anyhow!("panel is not reachable"));
            }
        }
        Command::ListSubs => {
            let subs = client.list_subscriptions().await?;
            println!("{} subscription group(s)", subs.len());
            for sub in &subs {
                println!("  {} ({} member(s))", sub.sub_id, sub.members.len());
            }
        }
        Command::GetSub { sub_id } => match client.get_subscription(&sub_id).await? {
            Some(sub) => {
                println!("{}:", sub.sub_id);
                for member in &sub.members {
                    println!(
                        "  inbound {} [{}] {} -> {}",
                        member.inbound_id,
                        member.protocol,
                        member.inbound_remark,
                        member.client.email
                    );
                }
            }
            None => return Err(anyhow!("subscription '{}' not found", sub_id)),
        },
        Command::MassCreate {
            sub_id,
            email,
            limit_ip,
            traffic,
            expiry,
            flow,
            inbounds,
        } => {
            let request = MassClientRequest {
                sub_id,
                email,
                limit_ip: limit_ip.map(Limit::Fixed).unwrap_or_default(),
                traffic: traffic.unwrap_or_default(),
                expiry_time: expiry.map(Limit::Fixed).unwrap_or_default(),
                flow,
                ..Default::default()
            };
            let report = client.mass_create(&request, inbounds.as_deref()).await?;
            print_report("mass create", &report);
            if report.failed > 0 {
                return Err(anyhow!("{} target(s) failed", report.failed));
            }
        }
        Command::DeleteSub { sub_id } => {
            let report = client.delete_by_subscription(&sub_id).await?;
            print_report("mass delete", &report);
            if report.failed > 0 {
                return Err(anyhow!("{} target(s) failed", report.failed));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("bogus").is_err());
    }

    #[test]
    fn test_parse_traffic_formats() {
        assert_eq!(
            parse_traffic("10GB").unwrap(),
            TrafficLimit::Size {
                value: 10,
                unit: TrafficUnit::Gb
            }
        );
        assert_eq!(
            parse_traffic("500 mb").unwrap(),
            TrafficLimit::Size {
                value: 500,
                unit: TrafficUnit::Mb
            }
        );
        assert_eq!(parse_traffic("unlimited").unwrap(), TrafficLimit::Unlimited);
        assert!(parse_traffic("10KB").is_err());
        assert!(parse_traffic("GB").is_err());
    }
}
