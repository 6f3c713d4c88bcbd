//! [`ExtensionRegistry`] – per-tick and per-sample fan-out to named observers.
//!
//! Once per tick the vehicle status goes to every extension through
//! [`Extension::on_status`], whether or not the tick carried samples.  Then
//! every incoming [`SensorSample`] is handed to each attached [`Extension`]
//! in attachment order together with the mutable robot context `C`.  An
//! extension that returns an [`AbortSignal`] stops dispatch for that sample;
//! the signal is returned to the caller unchanged.
//!
//! The registry is a separate value from the context it dispatches into, so
//! an extension cannot reach the registry while it is being dispatched:
//! attaching or detaching from inside a callback does not compile.
//!
//! # Example
//!
//! ```
//! use navpat_kernel::extension::{ExtensionRegistry, from_fn};
//! use navpat_types::{GeoFix, SensorPayload, SensorSample};
//!
//! let mut registry: ExtensionRegistry<u32> = ExtensionRegistry::new();
//! registry
//!     .attach("count", from_fn(|n: &mut u32, _: &SensorSample| {
//!         *n += 1;
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let sample = SensorSample::new(0.0, SensorPayload::Positioning(GeoFix {
//!     latitude: 50.0,
//!     longitude: 14.4,
//! }));
//! let mut count = 0;
//! registry.dispatch(&mut count, &sample).unwrap();
//! assert_eq!(count, 1);
//! ```

use navpat_types::{AbortSignal, NavError, SensorSample, VehicleStatus};
use tracing::{debug, trace};

// ────────────────────────────────────────────────────────────────────────────
// Extension trait
// ────────────────────────────────────────────────────────────────────────────

/// Observer invoked synchronously on every tick and every sensor sample.
///
/// Returning `Err` from either hook aborts the currently running motion
/// sequence.
pub trait Extension<C> {
    /// Inspect the tick's vehicle status.  Runs before the tick's samples,
    /// also on ticks that carry none.
    fn on_status(&mut self, _ctx: &mut C, _status: &VehicleStatus) -> Result<(), AbortSignal> {
        Ok(())
    }

    /// Inspect `sample`, optionally updating `ctx`.
    fn on_sample(&mut self, _ctx: &mut C, _sample: &SensorSample) -> Result<(), AbortSignal> {
        Ok(())
    }
}

/// Adapter turning a closure into an [`Extension`].
pub struct FnExtension<F>(F);

/// Wrap `f` as an [`Extension`].
pub fn from_fn<C, F>(f: F) -> FnExtension<F>
where
    F: FnMut(&mut C, &SensorSample) -> Result<(), AbortSignal>,
{
    FnExtension(f)
}

impl<C, F> Extension<C> for FnExtension<F>
where
    F: FnMut(&mut C, &SensorSample) -> Result<(), AbortSignal>,
{
    fn on_sample(&mut self, ctx: &mut C, sample: &SensorSample) -> Result<(), AbortSignal> {
        (self.0)(ctx, sample)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ExtensionRegistry
// ────────────────────────────────────────────────────────────────────────────

struct Entry<C> {
    name: String,
    extension: Box<dyn Extension<C>>,
}

pub struct ExtensionRegistry<C> {
    entries: Vec<Entry<C>>,
}

impl<C> Default for ExtensionRegistry<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C> ExtensionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `extension` under `name`.  Names are unique.
    pub fn attach(
        &mut self,
        name: impl Into<String>,
        extension: impl Extension<C> + 'static,
    ) -> Result<(), NavError> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(NavError::DuplicateExtension(name));
        }
        debug!(extension = %name, position = self.entries.len(), "extension attached");
        self.entries.push(Entry {
            name,
            extension: Box::new(extension),
        });
        Ok(())
    }

    /// Remove a single extension.  Returns `false` if it was not attached.
    pub fn detach(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }

    /// Remove every extension and return how many there were.
    pub fn detach_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        debug!(count = n, "extensions detached");
        n
    }

    /// Hand the tick's status to every extension in order, stopping at the
    /// first abort.
    pub fn dispatch_status(
        &mut self,
        ctx: &mut C,
        status: &VehicleStatus,
    ) -> Result<(), AbortSignal> {
        for entry in &mut self.entries {
            trace!(extension = %entry.name, time = status.time, "dispatch status");
            entry.extension.on_status(ctx, status)?;
        }
        Ok(())
    }

    /// Invoke every extension in order, stopping at the first abort.
    pub fn dispatch(&mut self, ctx: &mut C, sample: &SensorSample) -> Result<(), AbortSignal> {
        for entry in &mut self.entries {
            trace!(extension = %entry.name, source = %sample.source_id(), "dispatch");
            entry.extension.on_sample(ctx, sample)?;
        }
        Ok(())
    }

    /// Attached names in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navpat_types::{RangingScan, SensorPayload};

    fn sample() -> SensorSample {
        SensorSample::new(1.0, SensorPayload::Ranging(RangingScan::new(vec![1000; 3])))
    }

    fn push(tag: &'static str) -> FnExtension<impl FnMut(&mut Vec<&'static str>, &SensorSample) -> Result<(), AbortSignal>> {
        from_fn(move |log: &mut Vec<&'static str>, _: &SensorSample| {
            log.push(tag);
            Ok(())
        })
    }

    #[test]
    fn dispatch_follows_attachment_order() {
        let mut registry: ExtensionRegistry<Vec<&'static str>> = ExtensionRegistry::new();
        registry.attach("a", push("a")).unwrap();
        registry.attach("b", push("b")).unwrap();
        registry.attach("c", push("c")).unwrap();

        let mut log = Vec::new();
        registry.dispatch(&mut log, &sample()).unwrap();
        registry.dispatch(&mut log, &sample()).unwrap();
        assert_eq!(log, vec!["a", "b", "c", "a", "b", "c"]);
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry: ExtensionRegistry<Vec<&'static str>> = ExtensionRegistry::new();
        registry.attach("landmarks", push("x")).unwrap();
        let err = registry.attach("landmarks", push("y")).unwrap_err();
        assert!(matches!(err, NavError::DuplicateExtension(ref n) if n == "landmarks"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn abort_stops_later_extensions() {
        let mut registry: ExtensionRegistry<Vec<&'static str>> = ExtensionRegistry::new();
        registry.attach("first", push("first")).unwrap();
        registry
            .attach(
                "stop",
                from_fn(|_: &mut Vec<&'static str>, _: &SensorSample| {
                    Err(AbortSignal::EmergencyStop)
                }),
            )
            .unwrap();
        registry.attach("never", push("never")).unwrap();

        let mut log = Vec::new();
        assert_eq!(
            registry.dispatch(&mut log, &sample()),
            Err(AbortSignal::EmergencyStop)
        );
        assert_eq!(log, vec!["first"]);
    }

    #[test]
    fn detach_all_empties_the_registry() {
        let mut registry: ExtensionRegistry<Vec<&'static str>> = ExtensionRegistry::new();
        registry.attach("a", push("a")).unwrap();
        registry.attach("b", push("b")).unwrap();
        assert_eq!(registry.detach_all(), 2);
        assert!(registry.is_empty());

        let mut log = Vec::new();
        registry.dispatch(&mut log, &sample()).unwrap();
        assert!(log.is_empty());

        // Names are free again after teardown.
        registry.attach("a", push("a")).unwrap();
    }

    struct StatusLog;

    impl Extension<Vec<&'static str>> for StatusLog {
        fn on_status(
            &mut self,
            log: &mut Vec<&'static str>,
            _: &VehicleStatus,
        ) -> Result<(), AbortSignal> {
            log.push("status");
            Ok(())
        }
    }

    #[test]
    fn status_reaches_extensions_without_samples() {
        let mut registry: ExtensionRegistry<Vec<&'static str>> = ExtensionRegistry::new();
        registry.attach("status", StatusLog).unwrap();
        // Closures only observe samples.
        registry.attach("sample", push("sample")).unwrap();

        let mut log = Vec::new();
        registry
            .dispatch_status(&mut log, &VehicleStatus::default())
            .unwrap();
        assert_eq!(log, vec!["status"]);

        registry.dispatch(&mut log, &sample()).unwrap();
        assert_eq!(log, vec!["status", "sample"]);
    }

    #[test]
    fn detach_single_extension() {
        let mut registry: ExtensionRegistry<Vec<&'static str>> = ExtensionRegistry::new();
        registry.attach("a", push("a")).unwrap();
        registry.attach("b", push("b")).unwrap();
        assert!(registry.detach("a"));
        assert!(!registry.detach("a"));
        assert_eq!(registry.names(), vec!["b"]);
    }
}
