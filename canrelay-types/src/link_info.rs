//! Bus link information

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::TransportKind;

/// Snapshot of the hardware link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Outbound `lan2can` peer
    pub outbound: String,

    /// Inbound `can2lan` peer (the hardware's address once it connected back)
    pub inbound: String,

    pub transport: TransportKind,

    /// When the handshake completed
    pub established_at: Option<DateTime<Utc>>,

    /// Completed transactions
    pub transactions: u64,
}

impl LinkInfo {
    pub fn new(outbound: String, inbound: String, transport: TransportKind) -> Self {
        Self {
            outbound,
            inbound,
            transport,
            established_at: None,
            transactions: 0,
        }
    }

    /// Time since establishment, if established
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.established_at.map(|at| now - at)
    }
}

impl fmt::Display for LinkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Link[{}, out: {}, in: {}, transactions: {}]",
            self.transport, self.outbound, self.inbound, self.transactions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_link_info_display() {
        let mut info = LinkInfo::new("10.0.0.5:2000".into(), "10.0.0.5:4711".into(), TransportKind::Tcp);
        info.transactions = 3;

        assert_eq!(
            info.to_string(),
            "Link[tcp, out: 10.0.0.5:2000, in: 10.0.0.5:4711, transactions: 3]"
        );
    }

    #[test]
    fn test_link_info_uptime() {
        let mut info = LinkInfo::new("a".into(), "b".into(), TransportKind::Udp);
        let start = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 3, 12, 1, 30).unwrap();

        assert!(info.uptime(now).is_none());

        info.established_at = Some(start);
        assert_eq!(info.uptime(now), Some(chrono::Duration::seconds(90)));
    }
}
