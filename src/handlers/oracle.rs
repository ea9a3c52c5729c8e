//! Oracle deviation checks.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::HandlerError;
use crate::registry::{ComputationHandler, InputSchema, OutputSchema, ParamSpec, ParamType};
use crate::sources::{OracleReader, OracleReading};
use crate::types::args::TaskArgs;
use crate::types::result::{ComputationOutput, OracleHealthOutput, OracleStatus};

/// Checks each oracle's deviation against a threshold.
///
/// An oracle that cannot be read is recorded as unhealthy with maximal
/// deviation; it never fails the attempt.
pub struct OracleHealthHandler {
    reader: Arc<dyn OracleReader>,
    default_threshold: f64,
}

impl std::fmt::Debug for OracleHealthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleHealthHandler")
            .field("default_threshold", &self.default_threshold)
            .finish_non_exhaustive()
    }
}

impl OracleHealthHandler {
    /// Handler reading from `reader`; requests without a threshold use
    /// `default_threshold`.
    pub fn new(reader: Arc<dyn OracleReader>, default_threshold: f64) -> Self {
        Self {
            reader,
            default_threshold,
        }
    }

    /// `oracle_addresses, timestamp, [deviation_threshold]`.
    pub fn input_schema() -> InputSchema {
        InputSchema::new(vec![
            ParamSpec::required("oracle_addresses", ParamType::StringList),
            ParamSpec::required("timestamp", ParamType::Integer),
            ParamSpec::optional("deviation_threshold", ParamType::Number),
        ])
    }

    /// Fields every oracle-health output carries.
    pub fn output_schema() -> OutputSchema {
        OutputSchema::new([
            "oracle_status",
            "overall_health",
            "average_deviation",
            "timestamp",
        ])
    }
}

/// Folds per-oracle readings into the aggregate verdict.
///
/// `overall_health` is `true` iff every entry is healthy, which includes the
/// empty case; `average_deviation` of an empty set is 0.
pub fn assess(
    readings: BTreeMap<String, Option<OracleReading>>,
    threshold: f64,
    checked_at: i64,
) -> OracleHealthOutput {
    let oracle_status: BTreeMap<String, OracleStatus> = readings
        .into_iter()
        .map(|(address, reading)| {
            let status = match reading {
                Some(reading) => {
                    let deviation = reading.deviation.clamp(0.0, 1.0);
                    OracleStatus {
                        healthy: deviation < threshold,
                        deviation,
                        last_update: Some(reading.last_update),
                        confidence: reading.confidence.clamp(0.0, 1.0),
                    }
                },
                None => OracleStatus::unreachable(),
            };
            (address, status)
        })
        .collect();

    let overall_health = oracle_status.values().all(|s| s.healthy);
    let average_deviation = if oracle_status.is_empty() {
        0.0
    } else {
        oracle_status.values().map(|s| s.deviation).sum::<f64>() / oracle_status.len() as f64
    };

    OracleHealthOutput {
        oracle_status,
        overall_health,
        average_deviation,
        deviation_threshold: threshold,
        checked_at,
    }
}

#[async_trait]
impl ComputationHandler for OracleHealthHandler {
    async fn compute(&self, args: &TaskArgs) -> Result<ComputationOutput, HandlerError> {
        let TaskArgs::OracleHealth(args) = args else {
            return Err(HandlerError::ArgumentMismatch {
                expected: "oracle_health",
                got: args.kind().as_str(),
            });
        };

        let threshold = args.deviation_threshold.unwrap_or(self.default_threshold);
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(HandlerError::rejected(format!(
                "deviation threshold {threshold} is outside (0, 1]"
            )));
        }

        let reads = join_all(
            args.oracle_addresses
                .iter()
                .map(|address| self.reader.read(address)),
        )
        .await;

        let readings = args
            .oracle_addresses
            .iter()
            .zip(reads)
            .map(|(address, read)| {
                let reading = match read {
                    Ok(reading) => Some(reading),
                    Err(e) => {
                        warn!(oracle = %address, error = %e, "oracle read failed, marking unhealthy");
                        None
                    },
                };
                (address.clone(), reading)
            })
            .collect();

        Ok(ComputationOutput::OracleHealth(assess(readings, threshold, args.timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticOracleReader;
    use crate::types::args::OracleHealthArgs;

    fn reading(deviation: f64) -> OracleReading {
        OracleReading {
            deviation,
            last_update: 1_700_000_000,
            confidence: 0.95,
        }
    }

    fn oracle_args(addresses: &[&str], threshold: Option<f64>) -> TaskArgs {
        TaskArgs::OracleHealth(OracleHealthArgs {
            oracle_addresses: addresses.iter().map(|s| s.to_string()).collect(),
            timestamp: 1_700_000_100,
            deviation_threshold: threshold,
        })
    }

    async fn run(handler: &OracleHealthHandler, args: TaskArgs) -> OracleHealthOutput {
        match handler.compute(&args).await.unwrap() {
            ComputationOutput::OracleHealth(out) => out,
            other => panic!("wrong output kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_oracle_is_forced_unhealthy() {
        let reader = StaticOracleReader::new().with_reading("0xgood", reading(0.005));
        let handler = OracleHealthHandler::new(Arc::new(reader), 0.02);

        let out = run(&handler, oracle_args(&["0xgood", "0xgone"], None)).await;
        assert!(out.oracle_status["0xgood"].healthy);
        assert_eq!(out.oracle_status["0xgone"], OracleStatus::unreachable());
        assert!(!out.overall_health);
        assert!((out.average_deviation - 0.5025).abs() < 1e-12);
        assert_eq!(out.deviation_threshold, 0.02);
    }

    #[tokio::test]
    async fn explicit_threshold_overrides_default() {
        let reader = StaticOracleReader::new().with_reading("0xa", reading(0.03));
        let handler = OracleHealthHandler::new(Arc::new(reader), 0.02);

        let out = run(&handler, oracle_args(&["0xa"], Some(0.05))).await;
        assert!(out.overall_health);
        let out = run(&handler, oracle_args(&["0xa"], None)).await;
        assert!(!out.overall_health);
    }

    #[tokio::test]
    async fn deviation_equal_to_threshold_is_unhealthy() {
        let reader = StaticOracleReader::new().with_reading("0xa", reading(0.02));
        let handler = OracleHealthHandler::new(Arc::new(reader), 0.02);
        let out = run(&handler, oracle_args(&["0xa"], None)).await;
        assert!(!out.oracle_status["0xa"].healthy);
    }

    #[tokio::test]
    async fn empty_oracle_list_is_healthy() {
        let handler = OracleHealthHandler::new(Arc::new(StaticOracleReader::new()), 0.02);
        let out = run(&handler, oracle_args(&[], None)).await;
        assert!(out.overall_health);
        assert_eq!(out.average_deviation, 0.0);
    }

    #[tokio::test]
    async fn out_of_range_threshold_is_rejected() {
        let handler = OracleHealthHandler::new(Arc::new(StaticOracleReader::new()), 0.02);
        let err = handler.compute(&oracle_args(&["0xa"], Some(1.5))).await.unwrap_err();
        assert!(matches!(err, HandlerError::Rejected { .. }));
    }
}
