//! Fee resolution: ordered fallback chain over priced sources.
//!
//! Lookup is exact on (schedule, system, code, modifier slots): a code
//! with modifier 25 is a distinct priced entity from the bare code. A
//! miss, error, or timeout at one tier falls through to the next:
//! contracted → chargemaster → published reference → fixed default. The
//! tier that satisfied the lookup travels with the claim line as its
//! `rate_source` for audit.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::{self, DatabaseError};
use crate::models::enums::{CodeSystem, RateSource};
use crate::models::ModifierSet;

/// An owned lookup request, cloneable so slow sources can be queried on
/// a worker thread without borrowing the caller's state.
#[derive(Debug, Clone)]
pub struct FeeLookup {
    pub code_system: CodeSystem,
    pub code: String,
    pub modifiers: ModifierSet,
}

#[derive(Error, Debug)]
pub enum FeeSourceError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Source timed out")]
    Timeout,

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// One priced tier. Implementations may be local tables or remote
/// services; `Ok(None)` means "no match here", errors and timeouts are
/// treated the same way by the resolver.
pub trait FeeSource {
    fn rate_source(&self) -> RateSource;
    fn lookup(&self, request: &FeeLookup) -> Result<Option<Decimal>, FeeSourceError>;
}

/// A tier backed by one schedule in the local fee_schedule_entries table.
pub struct ScheduleFeeSource<'c> {
    conn: &'c Connection,
    schedule_id: String,
    rate_source: RateSource,
}

impl<'c> ScheduleFeeSource<'c> {
    pub fn new(conn: &'c Connection, schedule_id: impl Into<String>, rate_source: RateSource) -> Self {
        Self { conn, schedule_id: schedule_id.into(), rate_source }
    }
}

impl FeeSource for ScheduleFeeSource<'_> {
    fn rate_source(&self) -> RateSource {
        self.rate_source
    }

    fn lookup(&self, request: &FeeLookup) -> Result<Option<Decimal>, FeeSourceError> {
        let entry = db::lookup_fee_entry(
            self.conn,
            &self.schedule_id,
            request.code_system,
            &request.code,
            &request.modifiers,
        )?;
        Ok(entry.map(|e| e.price))
    }
}

/// Wraps a potentially slow collaborator (remote rate service) with a
/// hard timeout. The inner call runs on a worker thread; if it misses
/// the deadline the resolver moves on to the next tier while the worker
/// finishes into a dropped channel.
pub struct TimeoutFeeSource<S> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S> TimeoutFeeSource<S>
where
    S: FeeSource + Send + Sync + 'static,
{
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner: Arc::new(inner), timeout }
    }
}

impl<S> FeeSource for TimeoutFeeSource<S>
where
    S: FeeSource + Send + Sync + 'static,
{
    fn rate_source(&self) -> RateSource {
        self.inner.rate_source()
    }

    fn lookup(&self, request: &FeeLookup) -> Result<Option<Decimal>, FeeSourceError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let request = request.clone();
        thread::spawn(move || {
            let _ = tx.send(inner.lookup(&request));
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(FeeSourceError::Timeout),
        }
    }
}

/// The price that came back, and which tier produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFee {
    pub price: Decimal,
    pub rate_source: RateSource,
}

impl ResolvedFee {
    /// True when anything other than the contracted rate priced the line.
    pub fn used_fallback(&self) -> bool {
        self.rate_source != RateSource::Contracted
    }
}

/// Schedule naming + default amount for the standard four-tier chain.
#[derive(Debug, Clone)]
pub struct FeeResolverConfig {
    /// Prefix for per-payer contracted schedules: `contracted:<payer_id>`.
    pub contracted_prefix: String,
    /// Provider standard charges.
    pub chargemaster_schedule: String,
    /// Published reference rates (Medicare PFS).
    pub reference_schedule: String,
    /// Last-resort amount when no tier matches. Never fails.
    pub default_amount: Decimal,
}

impl Default for FeeResolverConfig {
    fn default() -> Self {
        Self {
            contracted_prefix: "contracted".into(),
            chargemaster_schedule: "chargemaster".into(),
            reference_schedule: "medicare-pfs".into(),
            default_amount: Decimal::new(5000, 2), // 50.00
        }
    }
}

impl FeeResolverConfig {
    pub fn contracted_schedule_for(&self, payer_id: &str) -> String {
        format!("{}:{}", self.contracted_prefix, payer_id)
    }
}

/// Evaluates tiers in order; first hit wins. The final default never
/// misses, so resolution is total.
pub struct FeeResolver<'c> {
    tiers: Vec<Box<dyn FeeSource + 'c>>,
    default_amount: Decimal,
}

impl<'c> FeeResolver<'c> {
    pub fn new(tiers: Vec<Box<dyn FeeSource + 'c>>, default_amount: Decimal) -> Self {
        Self { tiers, default_amount }
    }

    /// The standard chain over local schedules:
    /// contracted(payer) → chargemaster → reference → default.
    pub fn standard(conn: &'c Connection, config: &FeeResolverConfig, payer_id: &str) -> Self {
        let tiers: Vec<Box<dyn FeeSource + 'c>> = vec![
            Box::new(ScheduleFeeSource::new(
                conn,
                config.contracted_schedule_for(payer_id),
                RateSource::Contracted,
            )),
            Box::new(ScheduleFeeSource::new(
                conn,
                config.chargemaster_schedule.clone(),
                RateSource::Chargemaster,
            )),
            Box::new(ScheduleFeeSource::new(
                conn,
                config.reference_schedule.clone(),
                RateSource::Reference,
            )),
        ];
        Self::new(tiers, config.default_amount)
    }

    pub fn resolve(&self, request: &FeeLookup) -> ResolvedFee {
        for tier in &self.tiers {
            match tier.lookup(request) {
                Ok(Some(price)) => {
                    return ResolvedFee { price, rate_source: tier.rate_source() };
                }
                Ok(None) => {
                    tracing::debug!(
                        tier = tier.rate_source().as_str(),
                        code = %request.code,
                        "fee tier miss"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        tier = tier.rate_source().as_str(),
                        code = %request.code,
                        error = %e,
                        "fee tier failed, falling through"
                    );
                }
            }
        }
        ResolvedFee { price: self.default_amount, rate_source: RateSource::Default }
    }
}
