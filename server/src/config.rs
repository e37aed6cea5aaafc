// Server configuration loaded from the environment

use std::{path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;
use tts_core::{InferenceDefaults, Speed, SynthesisSettings, DEFAULT_MAX_TEXT_LENGTH};

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_MODEL_CONFIG: &str = "models/pretrained_vi.onnx.json";
pub const DEFAULT_AUDIO_DIR: &str = "audio";
pub const DEFAULT_CACHE_SIZE: usize = 128;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub model_config_path: PathBuf,
    pub audio_output_dir: PathBuf,
    pub cache_size: usize,
    pub default_speed: Speed,
    pub noise_scale: Option<f32>,
    pub noise_w: Option<f32>,
    pub max_text_length: usize,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            model_config_path: PathBuf::from(DEFAULT_MODEL_CONFIG),
            audio_output_dir: PathBuf::from(DEFAULT_AUDIO_DIR),
            cache_size: DEFAULT_CACHE_SIZE,
            default_speed: Speed::Normal,
            noise_scale: None,
            noise_w: None,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
        }
    }
}

/// Parse `name` if set; an unparsable value is reported and skipped.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = raw, "ignoring invalid value, using default");
            None
        }
    }
}

/// Noise overrides must be finite numbers.
fn parse_noise(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<f32> {
    parse_var::<f32>(lookup, name).filter(|value| {
        if !value.is_finite() {
            warn!(var = name, value = %value, "ignoring non-finite value, using default");
        }
        value.is_finite()
    })
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = parse_var(&lookup, "SERVER_PORT")
            .or_else(|| parse_var(&lookup, "PORT"))
            .unwrap_or(defaults.port);

        let model_config_path = lookup("TTS_CONFIG_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                lookup("TTS_MODEL_PATH")
                    .filter(|v| !v.trim().is_empty())
                    .map(|model| PathBuf::from(format!("{model}.json")))
            })
            .unwrap_or(defaults.model_config_path);

        let audio_output_dir = lookup("TTS_AUDIO_OUTPUT_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.audio_output_dir);

        let default_speed = match lookup("TTS_DEFAULT_SPEED") {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "unknown TTS_DEFAULT_SPEED, using normal");
                Speed::Normal
            }),
            _ => defaults.default_speed,
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Self {
            port,
            model_config_path,
            audio_output_dir,
            cache_size: parse_var(&lookup, "TTS_CACHE_SIZE").unwrap_or(defaults.cache_size),
            default_speed,
            noise_scale: parse_noise(&lookup, "TTS_NOISE_SCALE"),
            noise_w: parse_noise(&lookup, "TTS_NOISE_W"),
            max_text_length: parse_var(&lookup, "TTS_MAX_TEXT_LENGTH")
                .unwrap_or(defaults.max_text_length),
            rate_limit_per_minute: parse_var(&lookup, "RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            cors_allowed_origins,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve noise parameters: explicit override, then the voice's own
    /// `inference` block, then the built-in defaults.
    pub fn synthesis_settings(&self, model: &InferenceDefaults) -> SynthesisSettings {
        let fallback = SynthesisSettings::default();
        SynthesisSettings {
            noise_scale: self
                .noise_scale
                .or(model.noise_scale)
                .unwrap_or(fallback.noise_scale),
            noise_w: self.noise_w.or(model.noise_w).unwrap_or(fallback.noise_w),
            max_text_length: self.max_text_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.model_config_path, PathBuf::from(DEFAULT_MODEL_CONFIG));
        assert_eq!(cfg.audio_output_dir, PathBuf::from("audio"));
        assert_eq!(cfg.cache_size, 128);
        assert_eq!(cfg.default_speed, Speed::Normal);
        assert_eq!(cfg.max_text_length, 10_000);
        assert!(cfg.cors_allowed_origins.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("SERVER_PORT", "9000"),
            ("TTS_AUDIO_OUTPUT_DIR", "/tmp/out"),
            ("TTS_CACHE_SIZE", "0"),
            ("TTS_DEFAULT_SPEED", "fast"),
            ("TTS_NOISE_SCALE", "0.667"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
        ]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.audio_output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.cache_size, 0);
        assert_eq!(cfg.default_speed, Speed::Fast);
        assert_eq!(cfg.noise_scale, Some(0.667));
        assert_eq!(
            cfg.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[
            ("SERVER_PORT", "not-a-port"),
            ("TTS_CACHE_SIZE", "-3"),
            ("TTS_DEFAULT_SPEED", "warp"),
        ]);
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.cache_size, 128);
        assert_eq!(cfg.default_speed, Speed::Normal);
    }

    #[test]
    fn test_non_finite_noise_is_ignored() {
        let cfg = config(&[("TTS_NOISE_SCALE", "NaN"), ("TTS_NOISE_W", "inf")]);
        assert_eq!(cfg.noise_scale, None);
        assert_eq!(cfg.noise_w, None);

        let settings = cfg.synthesis_settings(&InferenceDefaults::default());
        assert_eq!((settings.noise_scale, settings.noise_w), (0.5, 0.6));
    }

    #[test]
    fn test_model_path_derives_config_path() {
        let cfg = config(&[("TTS_MODEL_PATH", "voices/vi.onnx")]);
        assert_eq!(cfg.model_config_path, PathBuf::from("voices/vi.onnx.json"));

        let cfg = config(&[
            ("TTS_MODEL_PATH", "voices/vi.onnx"),
            ("TTS_CONFIG_PATH", "other.json"),
        ]);
        assert_eq!(cfg.model_config_path, PathBuf::from("other.json"));
    }

    #[test]
    fn test_noise_resolution_order() {
        let model = InferenceDefaults {
            noise_scale: Some(0.667),
            length_scale: Some(1.0),
            noise_w: Some(0.8),
        };

        let settings = config(&[]).synthesis_settings(&InferenceDefaults::default());
        assert_eq!((settings.noise_scale, settings.noise_w), (0.5, 0.6));

        let settings = config(&[]).synthesis_settings(&model);
        assert_eq!((settings.noise_scale, settings.noise_w), (0.667, 0.8));

        let settings = config(&[("TTS_NOISE_W", "0.3")]).synthesis_settings(&model);
        assert_eq!((settings.noise_scale, settings.noise_w), (0.667, 0.3));
    }
}
