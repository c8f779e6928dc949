//! Plugin registry selection and the non-streaming rejection rule.

use async_trait::async_trait;
use crosstalk_foundation::{Language, ProviderError};
use crosstalk_stt::plugins::{MockSttPlugin, NoOpSttPlugin};
use crosstalk_stt::{
    PluginCapabilities, PluginInfo, SttPlugin, SttPluginFactory, SttPluginRegistry,
    SttStreamConfig,
};

struct MockFactory;

impl SttPluginFactory for MockFactory {
    fn create(&self) -> Result<Box<dyn SttPlugin>, ProviderError> {
        Ok(Box::new(MockSttPlugin::with_script(Vec::new())))
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            id: "mock".into(),
            name: "Scripted mock STT".into(),
            requires_network: false,
            supported_languages: Language::ALL.to_vec(),
        }
    }

    fn check_requirements(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct NoOpFactory;

impl SttPluginFactory for NoOpFactory {
    fn create(&self) -> Result<Box<dyn SttPlugin>, ProviderError> {
        Ok(Box::new(NoOpSttPlugin::new()))
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            id: "noop".into(),
            name: "No-op STT".into(),
            requires_network: false,
            supported_languages: Language::ALL.to_vec(),
        }
    }

    fn check_requirements(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A backend that claims batch-only capabilities without a VAD gate.
struct BareBatchPlugin;

#[async_trait]
impl SttPlugin for BareBatchPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "bare-batch".into(),
            name: "Batch-only backend".into(),
            requires_network: true,
            supported_languages: vec![Language::English],
        }
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities {
            streaming: false,
            interim_results: false,
            utterance_end: false,
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn open_stream(
        &self,
        _config: SttStreamConfig,
    ) -> Result<crosstalk_stt::SttStream, ProviderError> {
        unreachable!("registry must reject before opening")
    }
}

struct BareBatchFactory;

impl SttPluginFactory for BareBatchFactory {
    fn create(&self) -> Result<Box<dyn SttPlugin>, ProviderError> {
        Ok(Box::new(BareBatchPlugin))
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            id: "bare-batch".into(),
            name: "Batch-only backend".into(),
            requires_network: true,
            supported_languages: vec![Language::English],
        }
    }

    fn check_requirements(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[test]
fn preferred_order_wins() {
    let mut registry = SttPluginRegistry::new();
    registry.register(Box::new(MockFactory));
    registry.register(Box::new(NoOpFactory));
    registry.set_preferred_order(vec!["noop".into(), "mock".into()]);

    let plugin = registry.create_best_available().unwrap();
    assert_eq!(plugin.info().id, "noop");
}

#[test]
fn unknown_plugin_id_is_unavailable() {
    let registry = SttPluginRegistry::new();
    assert!(matches!(
        registry.create_plugin("deepgram"),
        Err(ProviderError::Unavailable(_))
    ));
}

#[test]
fn non_streaming_plugin_is_rejected_without_vad_gate() {
    let mut registry = SttPluginRegistry::new();
    registry.register(Box::new(BareBatchFactory));

    match registry.create_plugin("bare-batch") {
        Err(ProviderError::InvalidInput(message)) => {
            assert!(message.contains("VAD"));
        }
        Ok(_) => panic!("expected InvalidInput, got Ok"),
        Err(other) => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn best_available_skips_rejected_batch_backend() {
    let mut registry = SttPluginRegistry::new();
    registry.register(Box::new(BareBatchFactory));
    registry.register(Box::new(MockFactory));

    let plugin = registry.create_best_available().unwrap();
    assert_eq!(plugin.info().id, "mock");
}
