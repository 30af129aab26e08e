//! SOA records and the serial bookkeeping that keeps them in step with
//! zone content.
//!
//! Every zone holds exactly one SOA row. Its content is the usual seven
//! space-separated fields; inside the crate it is handled as [`Soa`] and
//! only rendered to that string when written.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqliteConnection;
use thiserror::Error;

use crate::clock::Clock;
use crate::db::record_repo::{self, RecordData};
use crate::record_type::RecordType;

/// refresh / retry / expire / minimum written into every SOA.
pub const SOA_TIMER: u32 = 60;
/// Time-derived serials cycle through this many values.
pub const SERIAL_WINDOW: i64 = 10_000;
/// TTL of the SOA row itself.
const SOA_TTL: u32 = 3600;

#[derive(Debug, Error)]
pub enum SoaError {
    #[error("soa record is invalid")]
    Invalid,
    #[error("soa serial '{0}' is not a number")]
    BadSerial(String),
    #[error("zone has no soa record")]
    Missing,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub primary: String,
    pub responsible: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Soa {
    /// SOA with the fixed timer values.
    pub fn new(primary: impl Into<String>, responsible: impl Into<String>, serial: u32) -> Self {
        Self {
            primary: primary.into(),
            responsible: responsible.into(),
            serial,
            refresh: SOA_TIMER,
            retry: SOA_TIMER,
            expire: SOA_TIMER,
            minimum: SOA_TIMER,
        }
    }
}

impl fmt::Display for Soa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.primary,
            self.responsible,
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.minimum
        )
    }
}

impl FromStr for Soa {
    type Err = SoaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [primary, responsible, serial, refresh, retry, expire, minimum] = fields[..] else {
            return Err(SoaError::Invalid);
        };
        let timer = |v: &str| v.parse::<u32>().map_err(|_| SoaError::Invalid);

        Ok(Soa {
            primary: primary.to_string(),
            responsible: responsible.to_string(),
            serial: serial
                .parse()
                .map_err(|_| SoaError::BadSerial(serial.to_string()))?,
            refresh: timer(refresh)?,
            retry: timer(retry)?,
            expire: timer(expire)?,
            minimum: timer(minimum)?,
        })
    }
}

/// Keeps each zone's SOA row and serial current.
pub struct SerialProtocol {
    primary: String,
    responsible: String,
    clock: Arc<dyn Clock>,
}

impl SerialProtocol {
    pub fn new(
        primary: impl Into<String>,
        responsible: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            primary: primary.into(),
            responsible: responsible.into(),
            clock,
        }
    }

    /// Serial derived from the wall clock, in `0..SERIAL_WINDOW`.
    pub fn time_serial(&self) -> u32 {
        // rem_euclid keeps pre-epoch clocks in range too
        self.clock.now().timestamp().rem_euclid(SERIAL_WINDOW) as u32
    }

    /// First serial of a (re)initialised zone: above both the clock-derived
    /// value and whatever the zone carried before, never zero.
    ///
    /// A zone reset at `u32::MAX` wraps to 1, which RFC 1982 comparison
    /// still orders after the old serial.
    pub fn initial_serial(&self, previous: Option<u32>) -> u32 {
        match previous.unwrap_or(0).max(self.time_serial()).wrapping_add(1) {
            0 => 1,
            serial => serial,
        }
    }

    /// Compute the successor of a stored SOA.
    ///
    /// Field count is strict. An unreadable serial is replaced by a
    /// clock-derived one before incrementing. Timers are reset.
    pub fn advance(&self, current: &str) -> Result<Soa, SoaError> {
        let (primary, responsible, serial) = match current.parse::<Soa>() {
            Ok(soa) => (soa.primary, soa.responsible, soa.serial),
            Err(SoaError::BadSerial(_)) => {
                let mut fields = current.split_whitespace();
                let primary = fields.next().unwrap_or_default().to_string();
                let responsible = fields.next().unwrap_or_default().to_string();
                (primary, responsible, self.time_serial())
            }
            Err(SoaError::Invalid) => {
                // timers are rewritten anyway; only the field count is binding
                let fields: Vec<&str> = current.split_whitespace().collect();
                if fields.len() != 7 {
                    return Err(SoaError::Invalid);
                }
                let serial = fields[2].parse().unwrap_or_else(|_| self.time_serial());
                (fields[0].to_string(), fields[1].to_string(), serial)
            }
            Err(e) => return Err(e),
        };

        // RFC 1982: u32::MAX + 1 wraps to 0, which secondaries read as newer
        Ok(Soa::new(primary, responsible, serial.wrapping_add(1)))
    }

    /// Write the SOA of a freshly created or reset zone. Returns its serial.
    pub async fn stamp(
        &self,
        conn: &mut SqliteConnection,
        domain_id: i64,
        zone: &str,
        previous: Option<u32>,
    ) -> Result<u32, SoaError> {
        let soa = Soa::new(&self.primary, &self.responsible, self.initial_serial(previous));
        write_soa(conn, domain_id, zone, &soa).await?;
        Ok(soa.serial)
    }

    /// Bump the zone's serial after a record change in the same transaction.
    /// Returns the new serial.
    pub async fn bump(
        &self,
        conn: &mut SqliteConnection,
        domain_id: i64,
        zone: &str,
    ) -> Result<u32, SoaError> {
        let contents = record_repo::soa_contents(conn, domain_id).await?;
        let current = contents.first().ok_or(SoaError::Missing)?;
        if contents.len() > 1 {
            tracing::warn!(zone, count = contents.len(), "zone had several SOA rows, collapsing");
        }

        let soa = self.advance(current)?;
        record_repo::delete_soa(conn, domain_id).await?;
        write_soa(conn, domain_id, zone, &soa).await?;
        tracing::debug!(zone, serial = soa.serial, "soa serial bumped");
        Ok(soa.serial)
    }
}

/// Serial of a stored SOA content string, if it parses.
pub fn serial_of(content: &str) -> Option<u32> {
    content.parse::<Soa>().ok().map(|soa| soa.serial)
}

async fn write_soa(
    conn: &mut SqliteConnection,
    domain_id: i64,
    zone: &str,
    soa: &Soa,
) -> Result<(), SoaError> {
    let content = soa.to_string();
    let data = RecordData {
        name: zone,
        rtype: RecordType::Soa,
        content: &content,
        ttl: SOA_TTL,
    };
    record_repo::insert(conn, domain_id, data, i64::from(soa.serial)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn protocol_at(unix: i64) -> SerialProtocol {
        let clock = Arc::new(FixedClock::new(Utc.timestamp_opt(unix, 0).unwrap()));
        SerialProtocol::new("ns1.example.net.", "hostmaster.example.net.", clock)
    }

    #[test]
    fn renders_and_parses_storage_format() {
        let soa = Soa::new("ns1.example.net.", "hostmaster.example.net.", 42);
        let text = soa.to_string();
        assert_eq!(text, "ns1.example.net. hostmaster.example.net. 42 60 60 60 60");
        assert_eq!(text.parse::<Soa>().unwrap(), soa);
    }

    #[test]
    fn wrong_field_count_is_invalid() {
        let p = protocol_at(1_700_000_000);
        assert!(matches!("a b 1 60 60 60".parse::<Soa>(), Err(SoaError::Invalid)));
        assert!(matches!(p.advance("a b 1 60 60 60 60 60"), Err(SoaError::Invalid)));
        assert!(matches!(p.advance(""), Err(SoaError::Invalid)));
        assert_eq!(SoaError::Invalid.to_string(), "soa record is invalid");
    }

    #[test]
    fn advance_increments_and_keeps_names() {
        let p = protocol_at(1_700_000_000);
        let next = p.advance("ns.a. admin.a. 41 300 300 300 300").unwrap();
        assert_eq!(next.serial, 42);
        assert_eq!(next.primary, "ns.a.");
        assert_eq!(next.responsible, "admin.a.");
        assert_eq!(next.refresh, SOA_TIMER);
        assert_eq!(next.minimum, SOA_TIMER);
    }

    #[test]
    fn unreadable_serial_is_regenerated_from_clock() {
        let p = protocol_at(1_700_001_234);
        let next = p.advance("ns.a. admin.a. banana 60 60 60 60").unwrap();
        assert_eq!(next.serial, 1_235);
        assert_eq!(next.primary, "ns.a.");
    }

    #[test]
    fn unreadable_timers_do_not_block_the_bump() {
        let p = protocol_at(1_700_000_000);
        let next = p.advance("ns.a. admin.a. 7 x y z w").unwrap();
        assert_eq!(next.serial, 8);
        assert_eq!(next.retry, SOA_TIMER);
    }

    #[test]
    fn initial_serial_is_nonzero_and_beats_previous() {
        // clock lands exactly on a window boundary
        let p = protocol_at(1_700_000_000);
        assert_eq!(p.time_serial(), 0);
        assert_eq!(p.initial_serial(None), 1);

        let p = protocol_at(1_700_000_500);
        assert_eq!(p.initial_serial(None), 501);
        assert_eq!(p.initial_serial(Some(9_000)), 9_001);
        assert_eq!(p.initial_serial(Some(10)), 501);
    }

    #[test]
    fn serial_wraps_at_the_top_of_the_space() {
        let p = protocol_at(0);
        let next = p.advance(&format!("a. b. {} 60 60 60 60", u32::MAX)).unwrap();
        assert_eq!(next.serial, 0);
        assert_eq!(p.advance(&next.to_string()).unwrap().serial, 1);
        assert_eq!(p.initial_serial(Some(u32::MAX)), 1);
    }

    #[test]
    fn serial_of_reads_stored_content() {
        assert_eq!(serial_of("a. b. 77 60 60 60 60"), Some(77));
        assert_eq!(serial_of("garbage"), None);
    }
}
