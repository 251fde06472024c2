//! Small shared helpers: clock, bps conversion, shutdown signal.

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, warn};

/// One unit expressed in basis points.
pub const BPS_PER_UNIT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Wall clock as unix milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// `bps` of `notional`, in quote currency.
pub fn bps_of(notional: Decimal, bps: Decimal) -> Decimal {
    notional * bps / BPS_PER_UNIT
}

/// Relative move from `from` to `to` in bps; zero when `from` is not positive.
pub fn edge_bps(from: Decimal, to: Decimal) -> Decimal {
    if from <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (to - from) / from * BPS_PER_UNIT
}

/// Resolves on Ctrl+C (and SIGTERM on unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn edge_is_exact_in_bps() {
        assert_eq!(edge_bps(dec!(100.00), dec!(100.50)), dec!(50));
        assert_eq!(edge_bps(dec!(2000), dec!(2006)), dec!(30));
        assert_eq!(edge_bps(dec!(0), dec!(1)), dec!(0));
    }

    #[test]
    fn bps_of_notional() {
        assert_eq!(bps_of(dec!(10000), dec!(7.5)), dec!(7.5));
        assert_eq!(BPS_PER_UNIT, dec!(10000));
    }

    #[test]
    fn now_ms_is_recent() {
        assert!(now_ms() > 1_600_000_000_000);
    }
}
