//! Status extraction from remote-console replies.
//!
//! The game server's `status` command prints free-form text whose layout
//! is owned by the server vendor.  Each field is matched by its own
//! pattern so a change to one line only loses that one field:
//!
//! ```text
//! hostname: My Jump Server
//! version : 8835751/24 8835751 secure
//! udp/ip  : 10.0.0.12:27015  (public IP from Steam: 203.0.113.5)
//! map     : jump_frags at: 0 x, 0 y, 0 z
//! players : 3 humans, 1 bots (24 max)
//! ```

use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;

use log::debug;
use regex::Regex;

use crate::runtime::{QueryError, RemoteQueryRunner};
use crate::types::StatusReport;

static PUBLIC_IP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public IP from Steam:\s*(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap()
});
static MAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*map\s*:\s*(\w+)").unwrap());
static PLAYERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*players\s*:\s*(\d+)\s+humans,\s*(\d+)\s+bots\s*\((\d+)\s+max\)").unwrap()
});
static HOSTNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*hostname\s*:(.*)$").unwrap());

/// Extract a [`StatusReport`] from raw `status` output.  Never fails; any
/// field whose line is missing or malformed is left unset.
pub fn extract(raw: &str) -> StatusReport {
    let (human_players, max_players) = match players(raw) {
        Some((humans, max)) => (Some(humans), Some(max)),
        None => (None, None),
    };

    StatusReport {
        public_ip: public_ip(raw),
        map: MAP.captures(raw).map(|c| c[1].to_string()),
        human_players,
        max_players,
        hostname: hostname(raw),
    }
}

fn public_ip(raw: &str) -> Option<String> {
    let caps = PUBLIC_IP.captures(raw)?;
    caps[1].parse::<Ipv4Addr>().ok().map(|ip| ip.to_string())
}

fn players(raw: &str) -> Option<(u32, u32)> {
    let caps = PLAYERS.captures(raw)?;
    let humans = caps[1].parse().ok()?;
    let max = caps[3].parse().ok()?;
    Some((humans, max))
}

fn hostname(raw: &str) -> Option<String> {
    let caps = HOSTNAME.captures(raw)?;
    let name = caps[1].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Run one `status` query through `runner` and extract the reply.
///
/// A query that does not finish within `timeout` fails with
/// [`QueryError::Timeout`]; transport failures are passed through rather
/// than turned into an empty report.
pub async fn query_status(
    runner: &dyn RemoteQueryRunner,
    timeout: Duration,
) -> Result<StatusReport, QueryError> {
    let raw = tokio::time::timeout(timeout, runner.query_status())
        .await
        .map_err(|_| QueryError::Timeout(timeout))??;
    debug!("Raw status reply:\n{}", raw);
    Ok(extract(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const FULL: &str = "\
hostname: My Jump Server
version : 8835751/24 8835751 secure
udp/ip  : 10.0.0.12:27015  (public IP from Steam: 203.0.113.5)
steamid : [G:1:1234567] (85568392921274567)
account : not logged in  (No account specified)
map     : jump_frags at: 0 x, 0 y, 0 z
tags    : cp,jump
sourcetv:  port 27020, delay 30.0s  (local: 10.0.0.12:27020)
players : 3 humans, 1 bots (24 max)
edicts  : 512 used of 2048 max
# userid name                uniqueid            connected ping loss state  adr
#      2 \"SourceTV\"          BOT                                     active
";

    fn without_line(text: &str, prefix: &str) -> String {
        text.lines()
            .filter(|l| !l.starts_with(prefix))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn extracts_every_field() {
        let report = extract(FULL);
        assert_eq!(
            report,
            StatusReport {
                public_ip: Some("203.0.113.5".into()),
                map: Some("jump_frags".into()),
                human_players: Some(3),
                max_players: Some(24),
                hostname: Some("My Jump Server".into()),
            }
        );
    }

    #[test]
    fn extracts_compact_labels() {
        let raw = "hostname: My Jump Server\n\
                   map : jump_frags\n\
                   players : 3 humans, 1 bots (24 max)\n\
                   public IP from Steam: 203.0.113.5\n";
        let report = extract(raw);
        assert_eq!(report.public_ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(report.map.as_deref(), Some("jump_frags"));
        assert_eq!(report.human_players, Some(3));
        assert_eq!(report.max_players, Some(24));
        assert_eq!(report.hostname.as_deref(), Some("My Jump Server"));
    }

    #[test]
    fn missing_hostname_keeps_other_fields() {
        let report = extract(&without_line(FULL, "hostname"));
        assert_eq!(report.hostname, None);
        assert_eq!(report.public_ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(report.map.as_deref(), Some("jump_frags"));
        assert_eq!(report.human_players, Some(3));
        assert_eq!(report.max_players, Some(24));
    }

    #[test]
    fn missing_map_keeps_other_fields() {
        let report = extract(&without_line(FULL, "map"));
        assert_eq!(report.map, None);
        assert_eq!(report.hostname.as_deref(), Some("My Jump Server"));
        assert_eq!(report.human_players, Some(3));
        assert_eq!(report.public_ip.as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn missing_players_keeps_other_fields() {
        let report = extract(&without_line(FULL, "players"));
        assert_eq!(report.human_players, None);
        assert_eq!(report.max_players, None);
        assert_eq!(report.map.as_deref(), Some("jump_frags"));
        assert_eq!(report.hostname.as_deref(), Some("My Jump Server"));
    }

    #[test]
    fn missing_public_ip_keeps_other_fields() {
        let report = extract(&without_line(FULL, "udp/ip"));
        assert_eq!(report.public_ip, None);
        assert_eq!(report.map.as_deref(), Some("jump_frags"));
        assert_eq!(report.max_players, Some(24));
    }

    #[test]
    fn malformed_player_counts_are_unset() {
        for line in [
            "players : three humans, 1 bots (24 max)",
            "players : 3 humans, 1 bots",
            "players : 3 humans, 1 bots (lots max)",
            "players : 99999999999 humans, 0 bots (24 max)",
        ] {
            let report = extract(&format!("map : cp_badlands\n{line}\n"));
            assert_eq!(report.human_players, None, "{line}");
            assert_eq!(report.max_players, None, "{line}");
            assert_eq!(report.map.as_deref(), Some("cp_badlands"), "{line}");
        }
    }

    #[test]
    fn rejects_out_of_range_address() {
        let report = extract("udp/ip : 0.0.0.0:27015 (public IP from Steam: 999.1.1.1)");
        assert_eq!(report.public_ip, None);
    }

    #[test]
    fn blank_hostname_is_unset() {
        assert_eq!(extract("hostname:   \nmap : koth_viaduct").hostname, None);
    }

    #[test]
    fn garbage_yields_empty_report() {
        assert_eq!(extract(""), StatusReport::default());
        assert_eq!(
            extract("Failed to connect to RCON server"),
            StatusReport::default()
        );
    }

    #[test]
    fn hostname_tolerates_crlf() {
        let report = extract("hostname: surf 24/7 - upfast\r\nmap     : surf_kitsune\r\n");
        assert_eq!(report.hostname.as_deref(), Some("surf 24/7 - upfast"));
        assert_eq!(report.map.as_deref(), Some("surf_kitsune"));
    }

    struct Canned(Result<String, QueryError>);

    #[async_trait]
    impl RemoteQueryRunner for Canned {
        async fn query_status(&self) -> Result<String, QueryError> {
            self.0.clone()
        }
    }

    struct Hangs;

    #[async_trait]
    impl RemoteQueryRunner for Hangs {
        async fn query_status(&self) -> Result<String, QueryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn query_status_extracts_reply() {
        let runner = Canned(Ok(FULL.to_string()));
        let report = query_status(&runner, Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.map.as_deref(), Some("jump_frags"));
    }

    #[tokio::test]
    async fn query_status_passes_errors_through() {
        let runner = Canned(Err(QueryError::ContainerNotFound("tf2-dedicated".into())));
        let err = query_status(&runner, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ContainerNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn query_status_times_out() {
        let err = query_status(&Hangs, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(d) if d == Duration::from_secs(5)));
    }
}
