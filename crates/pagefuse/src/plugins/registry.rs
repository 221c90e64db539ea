//! Capability registry.
//!
//! Each external capability occupies an `Option` slot resolved once when the
//! registry is built. Call sites ask the registry for a capability and get
//! `None` when it was never configured, failed to initialize, or has been
//! disabled for the run after a capability-level failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CapabilityKind;
use crate::plugins::{Plugin, RegionDetector, TableExtractor, TextRecognizer, VisionTranscriber};
use crate::{FusionError, Result};

fn validate_plugin_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FusionError::Validation {
            message: "Plugin name cannot be empty".to_string(),
            source: None,
        });
    }

    if name.contains(char::is_whitespace) {
        return Err(FusionError::Validation {
            message: format!("Plugin name '{}' cannot contain whitespace", name),
            source: None,
        });
    }

    Ok(())
}

/// Validate and initialize a plugin.
///
/// A bad name is a configuration error and is returned. A failing
/// `initialize` makes the capability unavailable: it is logged and `None` is
/// returned.
fn activate<T: ?Sized + Plugin>(kind: CapabilityKind, plugin: Option<Arc<T>>) -> Result<Option<Arc<T>>> {
    let Some(plugin) = plugin else {
        return Ok(None);
    };

    validate_plugin_name(plugin.name())?;

    match plugin.initialize() {
        Ok(()) => {
            tracing::debug!(capability = %kind, plugin = plugin.name(), version = %plugin.version(), "Capability ready");
            Ok(Some(plugin))
        }
        Err(e) => {
            tracing::warn!(
                capability = %kind,
                plugin = plugin.name(),
                error = %e,
                "Capability failed to initialize, continuing without it"
            );
            Ok(None)
        }
    }
}

/// Run-level availability flag for one capability.
#[derive(Debug, Default)]
struct DisableFlag(AtomicBool);

impl DisableFlag {
    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` only for the call that flipped the flag.
    fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Builder for [`CapabilityRegistry`].
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    detector: Option<Arc<dyn RegionDetector>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    table_extractor: Option<Arc<dyn TableExtractor>>,
    vision: Option<Arc<dyn VisionTranscriber>>,
}

impl CapabilityRegistryBuilder {
    pub fn region_detector(mut self, detector: Arc<dyn RegionDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn text_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn table_extractor(mut self, extractor: Arc<dyn TableExtractor>) -> Self {
        self.table_extractor = Some(extractor);
        self
    }

    pub fn vision_transcriber(mut self, transcriber: Arc<dyn VisionTranscriber>) -> Self {
        self.vision = Some(transcriber);
        self
    }

    /// Initialize every supplied capability and freeze the slots.
    ///
    /// # Errors
    ///
    /// `FusionError::Validation` when a plugin name is empty or contains
    /// whitespace. Initialization failures do not error.
    pub fn build(self) -> Result<CapabilityRegistry> {
        Ok(CapabilityRegistry {
            detector: activate(CapabilityKind::RegionDetector, self.detector)?,
            recognizer: activate(CapabilityKind::TextRecognizer, self.recognizer)?,
            table_extractor: activate(CapabilityKind::TableExtractor, self.table_extractor)?,
            vision: activate(CapabilityKind::VisionTranscriber, self.vision)?,
            detector_disabled: DisableFlag::default(),
            recognizer_disabled: DisableFlag::default(),
            table_extractor_disabled: DisableFlag::default(),
            vision_disabled: DisableFlag::default(),
        })
    }
}

/// The capabilities available to one engine instance.
///
/// The registry is immutable after [`build`](CapabilityRegistryBuilder::build)
/// apart from the run-level disable flags, which only ever go from enabled to
/// disabled.
pub struct CapabilityRegistry {
    detector: Option<Arc<dyn RegionDetector>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    table_extractor: Option<Arc<dyn TableExtractor>>,
    vision: Option<Arc<dyn VisionTranscriber>>,
    detector_disabled: DisableFlag,
    recognizer_disabled: DisableFlag,
    table_extractor_disabled: DisableFlag,
    vision_disabled: DisableFlag,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    /// A registry with no capabilities: native extraction only.
    pub fn empty() -> Self {
        Self {
            detector: None,
            recognizer: None,
            table_extractor: None,
            vision: None,
            detector_disabled: DisableFlag::default(),
            recognizer_disabled: DisableFlag::default(),
            table_extractor_disabled: DisableFlag::default(),
            vision_disabled: DisableFlag::default(),
        }
    }

    fn flag(&self, kind: CapabilityKind) -> &DisableFlag {
        match kind {
            CapabilityKind::RegionDetector => &self.detector_disabled,
            CapabilityKind::TextRecognizer => &self.recognizer_disabled,
            CapabilityKind::TableExtractor => &self.table_extractor_disabled,
            CapabilityKind::VisionTranscriber => &self.vision_disabled,
        }
    }

    fn configured(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::RegionDetector => self.detector.is_some(),
            CapabilityKind::TextRecognizer => self.recognizer.is_some(),
            CapabilityKind::TableExtractor => self.table_extractor.is_some(),
            CapabilityKind::VisionTranscriber => self.vision.is_some(),
        }
    }

    pub fn is_available(&self, kind: CapabilityKind) -> bool {
        self.configured(kind) && !self.flag(kind).is_set()
    }

    /// Disable a capability for the rest of the run.
    ///
    /// Logged once; later calls for the same capability are no-ops.
    pub fn disable(&self, kind: CapabilityKind, reason: &str) {
        if self.flag(kind).set() {
            tracing::warn!(capability = %kind, reason, "Capability disabled for the remainder of the run");
        }
    }

    pub fn is_disabled(&self, kind: CapabilityKind) -> bool {
        self.flag(kind).is_set()
    }

    pub fn region_detector(&self) -> Option<Arc<dyn RegionDetector>> {
        self.detector
            .as_ref()
            .filter(|_| !self.detector_disabled.is_set())
            .cloned()
    }

    pub fn text_recognizer(&self) -> Option<Arc<dyn TextRecognizer>> {
        self.recognizer
            .as_ref()
            .filter(|_| !self.recognizer_disabled.is_set())
            .cloned()
    }

    pub fn table_extractor(&self) -> Option<Arc<dyn TableExtractor>> {
        self.table_extractor
            .as_ref()
            .filter(|_| !self.table_extractor_disabled.is_set())
            .cloned()
    }

    pub fn vision_transcriber(&self) -> Option<Arc<dyn VisionTranscriber>> {
        self.vision.as_ref().filter(|_| !self.vision_disabled.is_set()).cloned()
    }

    /// Region OCR needs both a detector and a recognizer.
    pub fn hybrid_available(&self) -> bool {
        self.is_available(CapabilityKind::RegionDetector) && self.is_available(CapabilityKind::TextRecognizer)
    }

    /// Names of the configured plugins, in capability order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins().into_iter().map(|(_, p)| p.name().to_string()).collect()
    }

    fn plugins(&self) -> Vec<(CapabilityKind, &dyn Plugin)> {
        let mut plugins: Vec<(CapabilityKind, &dyn Plugin)> = Vec::with_capacity(4);
        if let Some(p) = &self.detector {
            plugins.push((CapabilityKind::RegionDetector, p.as_ref() as &dyn Plugin));
        }
        if let Some(p) = &self.recognizer {
            plugins.push((CapabilityKind::TextRecognizer, p.as_ref() as &dyn Plugin));
        }
        if let Some(p) = &self.table_extractor {
            plugins.push((CapabilityKind::TableExtractor, p.as_ref() as &dyn Plugin));
        }
        if let Some(p) = &self.vision {
            plugins.push((CapabilityKind::VisionTranscriber, p.as_ref() as &dyn Plugin));
        }
        plugins
    }

    /// Shut down every configured plugin.
    ///
    /// Errors are logged and do not stop the remaining shutdowns.
    pub fn shutdown(&self) {
        for (kind, plugin) in self.plugins() {
            if let Err(e) = plugin.shutdown() {
                tracing::warn!(capability = %kind, plugin = plugin.name(), error = %e, "Plugin shutdown failed");
            }
        }
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("plugins", &self.plugin_names())
            .field("detector_disabled", &self.detector_disabled.is_set())
            .field("recognizer_disabled", &self.recognizer_disabled.is_set())
            .field("table_extractor_disabled", &self.table_extractor_disabled.is_set())
            .field("vision_disabled", &self.vision_disabled.is_set())
            .finish()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityResult;
    use crate::types::Recognition;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::sync::atomic::AtomicUsize;

    struct MockRecognizer {
        name: String,
        fail_init: bool,
        shutdown_calls: AtomicUsize,
    }

    impl MockRecognizer {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_init: false,
                shutdown_calls: AtomicUsize::new(0),
            }
        }
    }

    impl Plugin for MockRecognizer {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> String {
            "1.0.0".to_string()
        }

        fn initialize(&self) -> Result<()> {
            if self.fail_init {
                return Err(FusionError::Plugin {
                    message: "model file missing".to_string(),
                    plugin_name: self.name.clone(),
                });
            }
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl TextRecognizer for MockRecognizer {
        async fn recognize_text(&self, _crop: &DynamicImage) -> CapabilityResult<Recognition> {
            Ok(Recognition::new("text", 0.9))
        }
    }

    #[test]
    fn test_empty_registry_has_nothing() {
        let registry = CapabilityRegistry::empty();
        assert!(registry.region_detector().is_none());
        assert!(registry.text_recognizer().is_none());
        assert!(registry.table_extractor().is_none());
        assert!(registry.vision_transcriber().is_none());
        assert!(!registry.hybrid_available());
        assert!(registry.plugin_names().is_empty());
    }

    #[test]
    fn test_builder_registers_capability() {
        let registry = CapabilityRegistry::builder()
            .text_recognizer(Arc::new(MockRecognizer::new("mock-recognizer")))
            .build()
            .unwrap();

        assert!(registry.text_recognizer().is_some());
        assert!(registry.is_available(CapabilityKind::TextRecognizer));
        assert!(!registry.hybrid_available());
        assert_eq!(registry.plugin_names(), vec!["mock-recognizer".to_string()]);
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let result = CapabilityRegistry::builder()
            .text_recognizer(Arc::new(MockRecognizer::new("bad name")))
            .build();
        assert!(matches!(result, Err(FusionError::Validation { .. })));

        let result = CapabilityRegistry::builder()
            .text_recognizer(Arc::new(MockRecognizer::new("")))
            .build();
        assert!(matches!(result, Err(FusionError::Validation { .. })));
    }

    #[test]
    fn test_failed_initialize_means_unavailable() {
        let mut recognizer = MockRecognizer::new("broken-recognizer");
        recognizer.fail_init = true;

        let registry = CapabilityRegistry::builder()
            .text_recognizer(Arc::new(recognizer))
            .build()
            .unwrap();

        assert!(registry.text_recognizer().is_none());
        assert!(!registry.is_available(CapabilityKind::TextRecognizer));
    }

    #[test]
    fn test_disable_is_sticky() {
        let registry = CapabilityRegistry::builder()
            .text_recognizer(Arc::new(MockRecognizer::new("mock-recognizer")))
            .build()
            .unwrap();

        registry.disable(CapabilityKind::TextRecognizer, "crashed");
        registry.disable(CapabilityKind::TextRecognizer, "crashed again");

        assert!(registry.is_disabled(CapabilityKind::TextRecognizer));
        assert!(registry.text_recognizer().is_none());
        assert!(!registry.is_disabled(CapabilityKind::RegionDetector));
    }

    #[test]
    fn test_shutdown_calls_each_plugin() {
        let recognizer = Arc::new(MockRecognizer::new("mock-recognizer"));
        let registry = CapabilityRegistry::builder()
            .text_recognizer(recognizer.clone())
            .build()
            .unwrap();

        registry.shutdown();
        assert_eq!(recognizer.shutdown_calls.load(Ordering::SeqCst), 1);
    }
}
