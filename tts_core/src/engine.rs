use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Instant,
};

use anyhow::Context;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use piper_rs::PiperSynthesisConfig;
use serde::Deserialize;
use tracing::{debug, info};

use crate::wav::{encode_wav, AudioFormat};

/// Inference knobs for one engine call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParams {
    pub length_scale: f32,
    pub noise_scale: f32,
    pub noise_w: f32,
}

/// Opaque text-to-audio capability.
///
/// `synthesize` is blocking (model inference) and must be called from a
/// blocking-friendly context. It returns a complete WAV file.
pub trait SynthesisEngine: Send + Sync {
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> anyhow::Result<Vec<u8>>;

    fn audio_format(&self) -> AudioFormat;
}

#[derive(Debug, Deserialize)]
struct ModelConfigFile {
    audio: Option<AudioSection>,
    inference: Option<InferenceDefaults>,
}

#[derive(Debug, Deserialize)]
struct AudioSection {
    sample_rate: u32,
}

/// `inference` block of a Piper voice config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct InferenceDefaults {
    pub noise_scale: Option<f32>,
    pub length_scale: Option<f32>,
    pub noise_w: Option<f32>,
}

fn read_model_config(cfg_path: &Path) -> anyhow::Result<ModelConfigFile> {
    let text = fs::read_to_string(cfg_path)
        .with_context(|| format!("Failed to read config file: {}", cfg_path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Config file is not valid JSON: {}", cfg_path.display()))
}

/// Inference defaults declared by a voice config, if any.
pub fn read_inference_defaults<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<InferenceDefaults> {
    Ok(read_model_config(cfg_path.as_ref())?
        .inference
        .unwrap_or_default())
}

/// Copy the per-call knobs into a voice's synthesis config. The speaker is
/// left as configured.
fn apply_params_to(config: &mut PiperSynthesisConfig, params: &SynthesisParams) {
    config.length_scale = params.length_scale;
    config.noise_scale = params.noise_scale;
    config.noise_w = params.noise_w;
}

type ParamSetter = Box<dyn Fn(&SynthesisParams) -> anyhow::Result<()> + Send + Sync>;

/// Piper VITS voice behind the [`SynthesisEngine`] seam.
///
/// piper-rs only takes length and noise values through the model's shared
/// fallback config, so a call writes that config and runs inference under
/// one engine-wide lock. Calls for different texts therefore queue on the
/// engine. The result cache holds no lock while they wait.
pub struct PiperEngine {
    config_path: PathBuf,
    set_params: ParamSetter,
    synth: Mutex<PiperSpeechSynthesizer>,
    format: AudioFormat,
}

impl fmt::Debug for PiperEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiperEngine")
            .field("config_path", &self.config_path)
            .field("synth", &"<PiperSpeechSynthesizer>")
            .field("format", &self.format)
            .finish()
    }
}

impl PiperEngine {
    /// Load a voice from its `<model>.onnx.json` config.
    pub fn from_config_path<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<Self> {
        let cfg_path = cfg_path.as_ref();
        let sample_rate = read_model_config(cfg_path)?
            .audio
            .map(|a| a.sample_rate)
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

        let started = Instant::now();
        let model = piper_rs::from_config_path(cfg_path)
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(Arc::clone(&model))
            .map_err(|e| anyhow::anyhow!("piper synthesizer error: {e}"))?;
        let set_params: ParamSetter = Box::new(move |params: &SynthesisParams| {
            let current = model
                .get_fallback_synthesis_config()
                .map_err(|e| anyhow::anyhow!("piper config error: {e}"))?;
            let mut config = current
                .downcast::<PiperSynthesisConfig>()
                .map_err(|_| anyhow::anyhow!("voice does not use a Piper synthesis config"))?;
            apply_params_to(&mut config, params);
            model
                .set_fallback_synthesis_config(&*config)
                .map_err(|e| anyhow::anyhow!("piper config error: {e}"))
        });
        info!(
            config = %cfg_path.display(),
            sample_rate,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Piper voice loaded"
        );

        Ok(Self {
            config_path: cfg_path.to_path_buf(),
            set_params,
            synth: Mutex::new(synth),
            format: AudioFormat::mono_16bit(sample_rate),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl SynthesisEngine for PiperEngine {
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> anyhow::Result<Vec<u8>> {
        let synth = self
            .synth
            .lock()
            .map_err(|_| anyhow::anyhow!("Synthesizer lock poisoned by an earlier panic"))?;
        (self.set_params)(params)?;

        debug!(
            text_length = text.len(),
            length_scale = params.length_scale,
            noise_scale = params.noise_scale,
            noise_w = params.noise_w,
            "running piper inference"
        );
        let iter: PiperSpeechStreamParallel = synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?
                    .into_vec(),
            );
        }
        drop(synth);

        if samples.is_empty() {
            anyhow::bail!("no audio data generated");
        }
        encode_wav(&samples, self.format.sample_rate)
    }

    fn audio_format(&self) -> AudioFormat {
        self.format
    }
}
