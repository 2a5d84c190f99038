//! Value codec — marshaling between the two type systems
//!
//! Total over the closed interchange set: null, bool, 64-bit int, f64,
//! UTF-8 string, bytes, list, string-keyed map, timestamp, duration.
//! Containers convert element-wise, depth-first, with destination capacity
//! reserved up front.
//!
//! Kinds outside the set fall back to class projection (the value crosses
//! as a wrapper object), except in scalar-only mode, used by
//! bridge-internal call sites, which fails with a conversion error naming
//! the offending type.

use std::collections::HashMap;

use crate::guest::value::{GuestDuration, GuestPayload, GuestRef, GuestTimestamp};
use crate::interp::GuestInterpreter;
use crate::{Bridge, BridgeError, BridgeResult, Duration, HostValue, Timestamp};

/// Calendar approximation used for guest relative durations. Lossy by
/// documented policy, kept for wire compatibility with existing bridge
/// deployments; the reverse conversion never reconstitutes years or months.
const APPROX_DAYS_PER_YEAR: i64 = 365;
const APPROX_DAYS_PER_MONTH: i64 = 30;

const MICROS_PER_SEC: i64 = 1_000_000;
const SECS_PER_DAY: i64 = 86_400;

pub(crate) fn duration_to_micros(d: &GuestDuration) -> i64 {
    let days =
        d.years as i64 * APPROX_DAYS_PER_YEAR + d.months as i64 * APPROX_DAYS_PER_MONTH
            + d.days as i64;
    (days * SECS_PER_DAY + d.secs) * MICROS_PER_SEC + d.micros
}

pub(crate) fn micros_to_duration(micros: i64) -> GuestDuration {
    let sub_sec = micros % MICROS_PER_SEC;
    let total_secs = micros / MICROS_PER_SEC;
    GuestDuration {
        years: 0,
        months: 0,
        days: (total_secs / SECS_PER_DAY) as i32,
        secs: total_secs % SECS_PER_DAY,
        micros: sub_sec,
    }
}

impl Bridge {
    /// Convert a host value into a guest value.
    ///
    /// Host objects with no interchange mapping cross as wrapper instances
    /// of a lazily projected class.
    pub fn to_guest(
        &self,
        interp: &GuestInterpreter,
        value: &HostValue,
    ) -> BridgeResult<GuestRef> {
        self.host_to_guest(Some(interp), value)
    }

    /// Convert a host value into a guest value, scalars only.
    ///
    /// Host objects are refused with a conversion error instead of falling
    /// back to projection.
    pub fn to_guest_scalar(&self, value: &HostValue) -> BridgeResult<GuestRef> {
        self.host_to_guest(None, value)
    }

    /// Convert a guest value into a host value.
    ///
    /// Guest values with no interchange mapping (instances of arbitrary
    /// classes, classes, callables, modules) cross as host wrapper objects
    /// of a lazily projected class.
    pub fn to_host(&self, interp: &GuestInterpreter, value: &GuestRef) -> BridgeResult<HostValue> {
        self.guest_to_host(Some(interp), value)
    }

    /// Convert a guest value into a host value, scalars only.
    pub fn to_host_scalar(&self, value: &GuestRef) -> BridgeResult<HostValue> {
        self.guest_to_host(None, value)
    }

    fn host_to_guest(
        &self,
        interp: Option<&GuestInterpreter>,
        value: &HostValue,
    ) -> BridgeResult<GuestRef> {
        match value {
            HostValue::Null => Ok(GuestRef::none()),
            HostValue::Bool(b) => Ok(GuestRef::bool(*b)),
            HostValue::Int(i) => Ok(GuestRef::int(*i)),
            HostValue::Float(f) => Ok(GuestRef::float(*f)),
            HostValue::Str(s) => Ok(GuestRef::str(s.clone())),
            HostValue::Bytes(b) => Ok(GuestRef::bytes(b.clone())),
            HostValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.host_to_guest(interp, item)?);
                }
                Ok(GuestRef::list(out))
            }
            HostValue::Map(entries) => {
                let mut out = HashMap::with_capacity(entries.len());
                for (key, item) in entries {
                    out.insert(key.clone(), self.host_to_guest(interp, item)?);
                }
                Ok(GuestRef::map(out))
            }
            HostValue::Timestamp(ts) => Ok(GuestRef::timestamp(GuestTimestamp::aware(
                ts.epoch_micros,
                ts.offset_secs,
            ))),
            HostValue::Duration(d) => Ok(GuestRef::duration(micros_to_duration(d.micros))),
            HostValue::Object(obj) => {
                // A wrapper around a guest value unwraps back to the original.
                if let Some(original) = self.unwrap_guest(obj) {
                    return Ok(original);
                }
                match interp {
                    Some(interp) => self.wrap_host(interp, obj),
                    None => Err(BridgeError::Conversion {
                        type_name: obj.class().qualified_name(),
                    }),
                }
            }
        }
    }

    fn guest_to_host(
        &self,
        interp: Option<&GuestInterpreter>,
        value: &GuestRef,
    ) -> BridgeResult<HostValue> {
        match value.payload() {
            GuestPayload::None => Ok(HostValue::Null),
            GuestPayload::Bool(b) => Ok(HostValue::Bool(*b)),
            GuestPayload::Int(i) => Ok(HostValue::Int(*i)),
            GuestPayload::Float(f) => Ok(HostValue::Float(*f)),
            GuestPayload::Str(s) => Ok(HostValue::Str(s.clone())),
            GuestPayload::Bytes(b) => Ok(HostValue::Bytes(b.clone())),
            GuestPayload::List(items) => {
                let items = items.lock();
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(self.guest_to_host(interp, item)?);
                }
                Ok(HostValue::List(out))
            }
            GuestPayload::Map(entries) => {
                let entries = entries.lock();
                let mut out = HashMap::with_capacity(entries.len());
                for (key, item) in entries.iter() {
                    out.insert(key.clone(), self.guest_to_host(interp, item)?);
                }
                Ok(HostValue::Map(out))
            }
            GuestPayload::Timestamp(ts) => {
                // Aware timestamps answer their own offset; naive ones
                // resolve against the configured default zone.
                let offset = ts
                    .utc_offset()
                    .unwrap_or(self.config().default_utc_offset_secs);
                Ok(HostValue::Timestamp(Timestamp::new(ts.epoch_micros, offset)))
            }
            GuestPayload::Duration(d) => {
                Ok(HostValue::Duration(Duration::from_micros(duration_to_micros(d))))
            }
            GuestPayload::Instance(inst) => {
                // A wrapper around a host object unwraps back to the original.
                if let Some(original) = inst.foreign() {
                    return Ok(HostValue::Object(original.clone()));
                }
                match interp {
                    Some(_) => Ok(HostValue::Object(self.wrap_guest(value)?)),
                    None => Err(BridgeError::Conversion {
                        type_name: value.type_name(),
                    }),
                }
            }
            GuestPayload::Class(_) | GuestPayload::Callable(_) | GuestPayload::Module(_) => {
                match interp {
                    Some(_) => Ok(HostValue::Object(self.wrap_guest(value)?)),
                    None => Err(BridgeError::Conversion {
                        type_name: value.type_name(),
                    }),
                }
            }
            GuestPayload::Capsule(_) => Err(BridgeError::Conversion {
                type_name: value.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_calendar_approximation() {
        let d = GuestDuration {
            years: 1,
            months: 1,
            days: 1,
            secs: 0,
            micros: 0,
        };
        // 365 + 30 + 1 days
        assert_eq!(duration_to_micros(&d), 396 * 86_400 * 1_000_000);
    }

    #[test]
    fn test_micros_to_duration_never_reconstitutes_calendar_parts() {
        let d = micros_to_duration(400 * 86_400 * 1_000_000);
        assert_eq!(d.years, 0);
        assert_eq!(d.months, 0);
        assert_eq!(d.days, 400);
        assert_eq!(d.secs, 0);
    }

    #[test]
    fn test_duration_split() {
        let micros = (2 * 86_400 + 3_600) * 1_000_000 + 250;
        let d = micros_to_duration(micros);
        assert_eq!(d.days, 2);
        assert_eq!(d.secs, 3_600);
        assert_eq!(d.micros, 250);
        assert_eq!(duration_to_micros(&d), micros);
    }

    #[test]
    fn test_negative_duration_round_trip() {
        let micros = -(90 * 1_000_000);
        let d = micros_to_duration(micros);
        assert_eq!(duration_to_micros(&d), micros);
    }
}
