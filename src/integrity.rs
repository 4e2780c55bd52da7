//! Tamper detection for canonical value bundles.
//!
//! A bundle is sealed exactly once, before it crosses the pipeline boundary
//! to any consumer. Sealing attaches a reproducible checksum and yields
//! [`SealedValueBundle`], an immutable value type: there is no way to
//! reassign a field through any reference, so the whole "mutated after
//! freeze" bug class is unrepresentable rather than merely detected.
//! Verification still exists for values that crossed a process boundary
//! (serialized to a cache, an API response, an export).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::GuardMode;
use crate::error::{PipelineError, Result};

/// Unsealed computation output handed over by the valuation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueBundle {
    pub entity_id: Uuid,
    pub value: f64,
    pub tier: i32,
    pub overall_rank: i32,
    pub position_rank: i32,
    /// Strictly increasing marker for the computation run that produced
    /// this value; used to detect staleness.
    pub value_epoch: i64,
    pub updated_at: DateTime<Utc>,
}

/// A checksummed, immutable value bundle. Construction goes through
/// [`IntegrityGuard::seal`]; fields are only readable afterwards. The
/// serde impls are the sanctioned wire representation, which is also the
/// only way a tampered instance can come into existence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedValueBundle {
    entity_id: Uuid,
    value: f64,
    tier: i32,
    overall_rank: i32,
    position_rank: i32,
    value_epoch: i64,
    updated_at: DateTime<Utc>,
    checksum: String,
}

impl SealedValueBundle {
    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn tier(&self) -> i32 {
        self.tier
    }

    pub fn overall_rank(&self) -> i32 {
        self.overall_rank
    }

    pub fn position_rank(&self) -> i32 {
        self.position_rank
    }

    pub fn value_epoch(&self) -> i64 {
        self.value_epoch
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    fn expected_checksum(&self) -> String {
        checksum_fields(
            self.entity_id,
            self.value,
            self.tier,
            self.overall_rank,
            self.position_rank,
            self.value_epoch,
            self.updated_at,
        )
    }
}

/// Outcome of a checksum verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumReport {
    pub valid: bool,
    /// Recomputed from the bundle's current field values.
    pub expected: String,
    /// The checksum attached at seal time (empty if absent).
    pub actual: String,
}

/// Rolling 32-bit checksum over the pipe-joined bundle fields.
///
/// The payload is
/// `entity_id|value|tier|overall_rank|position_rank|value_epoch|updated_at_ms`
/// with the value rendered by Rust's shortest `{}` float formatting and the
/// timestamp as Unix milliseconds. Each UTF-8 byte folds in as
/// `acc = acc * 31 + byte` on a wrapping signed 32-bit accumulator, and the
/// magnitude is rendered base-36. Not cryptographic; it only has to make
/// accidental or casual alteration visible with high probability.
pub fn checksum_fields(
    entity_id: Uuid,
    value: f64,
    tier: i32,
    overall_rank: i32,
    position_rank: i32,
    value_epoch: i64,
    updated_at: DateTime<Utc>,
) -> String {
    let payload = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        entity_id,
        value,
        tier,
        overall_rank,
        position_rank,
        value_epoch,
        updated_at.timestamp_millis()
    );
    let mut acc: i32 = 0;
    for byte in payload.bytes() {
        acc = acc.wrapping_mul(31).wrapping_add(i32::from(byte));
    }
    to_base36(acc.unsigned_abs())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Seals, verifies, and gates canonical value bundles.
///
/// The enforcement mode is explicit configuration, never inferred from a
/// build flag: `Strict` refuses to serve a failed bundle, `Observe` logs
/// and leaves the decision to the caller.
pub struct IntegrityGuard {
    mode: GuardMode,
}

impl IntegrityGuard {
    pub fn new(mode: GuardMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Checksum and seal a bundle. The only sanctioned way to produce a
    /// value that crosses the pipeline boundary.
    pub fn seal(&self, bundle: ValueBundle) -> SealedValueBundle {
        let checksum = checksum_fields(
            bundle.entity_id,
            bundle.value,
            bundle.tier,
            bundle.overall_rank,
            bundle.position_rank,
            bundle.value_epoch,
            bundle.updated_at,
        );
        SealedValueBundle {
            entity_id: bundle.entity_id,
            value: bundle.value,
            tier: bundle.tier,
            overall_rank: bundle.overall_rank,
            position_rank: bundle.position_rank,
            value_epoch: bundle.value_epoch,
            updated_at: bundle.updated_at,
            checksum,
        }
    }

    /// Recompute the checksum and compare with the attached one. A missing
    /// attached checksum is always invalid. Mismatches are logged as a
    /// named condition before the report is returned; detection is never
    /// silent.
    pub fn verify(&self, sealed: &SealedValueBundle) -> ChecksumReport {
        let expected = sealed.expected_checksum();
        let actual = sealed.checksum.clone();
        let valid = !actual.is_empty() && expected == actual;
        if !valid {
            error!(
                entity_id = %sealed.entity_id,
                expected = %expected,
                actual = %actual,
                "value bundle checksum mismatch"
            );
        }
        ChecksumReport {
            valid,
            expected,
            actual,
        }
    }

    /// Read-path gate. In strict mode a failed bundle must not propagate;
    /// in observe mode the violation is logged and the bundle passes.
    pub fn enforce<'a>(&self, sealed: &'a SealedValueBundle) -> Result<&'a SealedValueBundle> {
        let report = self.verify(sealed);
        if report.valid {
            return Ok(sealed);
        }
        match self.mode {
            GuardMode::Strict => Err(PipelineError::IntegrityViolation {
                entity_id: sealed.entity_id,
                expected: report.expected,
                actual: report.actual,
            }),
            GuardMode::Observe => {
                warn!(
                    entity_id = %sealed.entity_id,
                    "serving value bundle despite checksum mismatch (observe mode)"
                );
                Ok(sealed)
            }
        }
    }

    /// Composite soundness check. Returns every defect found and never
    /// fails; an empty list means the bundle is fully sound.
    ///
    /// Frozen state and field presence are guaranteed by the sealed type
    /// itself, so the remaining runtime defects are checksum integrity and
    /// value-domain problems that the type system cannot rule out.
    pub fn validate_integrity(&self, sealed: &SealedValueBundle) -> Vec<String> {
        let mut defects = Vec::new();
        if sealed.checksum.is_empty() {
            defects.push("checksum missing".to_string());
        } else {
            let expected = sealed.expected_checksum();
            if expected != sealed.checksum {
                defects.push(format!(
                    "checksum mismatch: expected {expected}, found {}",
                    sealed.checksum
                ));
            }
        }
        if !sealed.value.is_finite() {
            defects.push("value is not a finite number".to_string());
        }
        if sealed.entity_id.is_nil() {
            defects.push("entity id is nil".to_string());
        }
        if sealed.value_epoch <= 0 {
            defects.push("value epoch must be positive".to_string());
        }
        defects
    }

    /// Instrumentation hook for consumers that catch an attempted
    /// overwrite of sealed data before it reaches the type system (e.g. a
    /// rejected UPDATE against an exported row). Distinct from the
    /// compile-time rejection so that attempts are visible in logs.
    pub fn report_mutation_attempt(&self, entity_id: Uuid, field: &str) {
        error!(
            %entity_id,
            field,
            "mutation attempted on sealed value bundle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bundle() -> ValueBundle {
        ValueBundle {
            entity_id: Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap(),
            value: 287.5,
            tier: 1,
            overall_rank: 3,
            position_rank: 1,
            value_epoch: 42,
            updated_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn checksum_is_deterministic_and_field_sensitive() {
        let b = bundle();
        let token = checksum_fields(
            b.entity_id,
            b.value,
            b.tier,
            b.overall_rank,
            b.position_rank,
            b.value_epoch,
            b.updated_at,
        );
        let again = checksum_fields(
            b.entity_id,
            b.value,
            b.tier,
            b.overall_rank,
            b.position_rank,
            b.value_epoch,
            b.updated_at,
        );
        assert_eq!(token, again);
        assert!(!token.is_empty());
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

        let other = checksum_fields(
            b.entity_id,
            b.value + 0.1,
            b.tier,
            b.overall_rank,
            b.position_rank,
            b.value_epoch,
            b.updated_at,
        );
        assert_ne!(token, other);

        let other = checksum_fields(
            b.entity_id,
            b.value,
            b.tier,
            b.overall_rank,
            b.position_rank,
            b.value_epoch + 1,
            b.updated_at,
        );
        assert_ne!(token, other);
    }

    #[test]
    fn seal_then_verify_is_valid() {
        let guard = IntegrityGuard::new(GuardMode::Strict);
        let sealed = guard.seal(bundle());
        let report = guard.verify(&sealed);
        assert!(report.valid);
        assert_eq!(report.expected, report.actual);
        assert_eq!(sealed.checksum(), report.actual);
    }

    #[test]
    fn tampering_through_the_wire_form_is_detected() {
        let guard = IntegrityGuard::new(GuardMode::Strict);
        let sealed = guard.seal(bundle());

        // Alter one field through the only mutation channel that exists:
        // the serialized representation.
        let mut wire = serde_json::to_value(&sealed).unwrap();
        wire["value"] = serde_json::json!(999.9);
        let tampered: SealedValueBundle = serde_json::from_value(wire).unwrap();

        let report = guard.verify(&tampered);
        assert!(!report.valid);
        assert_ne!(report.expected, report.actual);
    }

    #[test]
    fn missing_checksum_is_always_invalid() {
        let guard = IntegrityGuard::new(GuardMode::Strict);
        let sealed = guard.seal(bundle());
        let mut wire = serde_json::to_value(&sealed).unwrap();
        wire["checksum"] = serde_json::json!("");
        let stripped: SealedValueBundle = serde_json::from_value(wire).unwrap();

        assert!(!guard.verify(&stripped).valid);
        assert!(guard
            .validate_integrity(&stripped)
            .iter()
            .any(|d| d == "checksum missing"));
    }

    #[test]
    fn strict_mode_refuses_to_serve_a_tampered_bundle() {
        let guard = IntegrityGuard::new(GuardMode::Strict);
        let sealed = guard.seal(bundle());
        let mut wire = serde_json::to_value(&sealed).unwrap();
        wire["tier"] = serde_json::json!(5);
        let tampered: SealedValueBundle = serde_json::from_value(wire).unwrap();

        let err = guard.enforce(&tampered).unwrap_err();
        assert!(matches!(err, PipelineError::IntegrityViolation { .. }));
    }

    #[test]
    fn observe_mode_logs_and_serves() {
        let guard = IntegrityGuard::new(GuardMode::Observe);
        let sealed = guard.seal(bundle());
        let mut wire = serde_json::to_value(&sealed).unwrap();
        wire["overall_rank"] = serde_json::json!(99);
        let tampered: SealedValueBundle = serde_json::from_value(wire).unwrap();

        assert!(guard.enforce(&tampered).is_ok());
    }

    #[test]
    fn validate_integrity_reports_all_defects() {
        let guard = IntegrityGuard::new(GuardMode::Strict);
        let mut b = bundle();
        b.entity_id = Uuid::nil();
        b.value = f64::NAN;
        b.value_epoch = 0;
        let sealed = guard.seal(b);

        let defects = guard.validate_integrity(&sealed);
        // NaN formats into the payload, so the seal-time checksum still
        // matches; the domain defects must all be present
        assert!(defects.iter().any(|d| d.contains("finite")));
        assert!(defects.iter().any(|d| d.contains("nil")));
        assert!(defects.iter().any(|d| d.contains("epoch")));
    }

    #[test]
    fn sound_bundle_has_no_defects() {
        let guard = IntegrityGuard::new(GuardMode::Strict);
        let sealed = guard.seal(bundle());
        assert!(guard.validate_integrity(&sealed).is_empty());
    }

    #[test]
    fn base36_rendering() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u32::MAX), "1z141z3");
    }
}
