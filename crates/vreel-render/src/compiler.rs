//! Compiles a composition script into the job spec the render engine accepts.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vreel_models::{Clip, CompositionScript, RenderJob, RenderJobId, TextOverlay, VideoId};

use crate::captions::{build_caption_document, FrameSize};
use crate::timecode::{frames_to_timecode, seconds_to_frames, DEFAULT_FRAME_RATE};

/// Compiler configuration.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Output frame rate
    pub frame_rate: u32,
    /// Output geometry
    pub frame: FrameSize,
    /// Where the engine posts first-stage callbacks
    pub callback_url: String,
    /// Output destination prefix
    pub output_prefix: String,
    /// Whether the first-stage engine can burn text itself
    pub engine_burns_text: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            frame: FrameSize::default(),
            callback_url: "http://localhost:8000/webhooks/render".to_string(),
            output_prefix: "renders".to_string(),
            engine_burns_text: false,
        }
    }
}

impl CompilerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let num = |key: &str, default: u32| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };
        Self {
            frame_rate: num("RENDER_FRAME_RATE", defaults.frame_rate),
            frame: FrameSize {
                width: num("RENDER_FRAME_WIDTH", defaults.frame.width),
                height: num("RENDER_FRAME_HEIGHT", defaults.frame.height),
            },
            callback_url: std::env::var("RENDER_CALLBACK_URL").unwrap_or(defaults.callback_url),
            output_prefix: std::env::var("RENDER_OUTPUT_PREFIX")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.output_prefix),
            engine_burns_text: std::env::var("RENDER_ENGINE_BURNS_TEXT")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.engine_burns_text),
        }
    }
}

/// One input clip in engine terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInput {
    pub source_url: String,
    pub order: u32,
    pub trim_start: String,
    pub trim_end: String,
    /// Position of the clip on the output timeline
    pub timeline_start: String,
    pub trim_start_frame: u64,
    pub trim_end_frame: u64,
    pub timeline_start_frame: u64,
}

/// Identifiers echoed back in callbacks and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub render_job_id: RenderJobId,
    pub video_id: VideoId,
    pub property_id: String,
}

impl From<&RenderJob> for JobMetadata {
    fn from(job: &RenderJob) -> Self {
        Self {
            render_job_id: job.id.clone(),
            video_id: job.video_id.clone(),
            property_id: job.property_id.clone(),
        }
    }
}

/// Everything the render engine needs for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJobSpec {
    pub metadata: JobMetadata,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub inputs: Vec<ClipInput>,
    /// TTML document, absent without overlays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions: Option<String>,
    /// Engine-wide fallback font family
    pub fallback_font: String,
    pub destination: String,
    pub callback_url: String,
    pub overlays: Vec<TextOverlay>,
    pub total_duration: String,
    pub requires_overlay_stage: bool,
}

/// Render job compiler.
#[derive(Debug, Clone, Default)]
pub struct RenderCompiler {
    config: CompilerConfig,
}

impl RenderCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Overlays that survive validation, in input order.
    fn valid_overlays(&self, script: &CompositionScript) -> Vec<TextOverlay> {
        script
            .overlays
            .iter()
            .filter(|overlay| match overlay.validate(Some(script.total_duration)) {
                Ok(()) => true,
                Err(e) => {
                    warn!(content = %overlay.content, "Dropping overlay: {}", e);
                    false
                }
            })
            .cloned()
            .collect()
    }

    fn clip_inputs(&self, clips: &[Clip]) -> Vec<ClipInput> {
        let fps = self.config.frame_rate;
        let mut ordered: Vec<&Clip> = clips.iter().collect();
        ordered.sort_by_key(|c| c.order);

        let mut elapsed = 0.0_f64;
        ordered
            .into_iter()
            .map(|clip| {
                // Timeline positions truncate the running total once, so
                // per-clip error never accumulates past a frame.
                let timeline_start_frame = seconds_to_frames(elapsed, fps);
                elapsed += clip.duration.max(0.0);

                let trim_start_frame = seconds_to_frames(clip.trim_start, fps);
                let trim_end_frame = seconds_to_frames(clip.trim_end, fps);
                ClipInput {
                    source_url: clip.source_url.clone(),
                    order: clip.order,
                    trim_start: frames_to_timecode(trim_start_frame, fps),
                    trim_end: frames_to_timecode(trim_end_frame, fps),
                    timeline_start: frames_to_timecode(timeline_start_frame, fps),
                    trim_start_frame,
                    trim_end_frame,
                    timeline_start_frame,
                }
            })
            .collect()
    }

    /// Compile a script. Deterministic: the same script yields the same spec.
    pub fn compile(&self, script: &CompositionScript, metadata: JobMetadata) -> RenderJobSpec {
        let fps = self.config.frame_rate;
        let inputs = self.clip_inputs(&script.clips);
        let overlays = self.valid_overlays(script);
        let captions = build_caption_document(&overlays, self.config.frame);
        let requires_overlay_stage = !overlays.is_empty() && !self.config.engine_burns_text;

        debug!(
            render_job_id = %metadata.render_job_id,
            clips = inputs.len(),
            overlays = overlays.len(),
            requires_overlay_stage,
            "Compiled render job"
        );

        RenderJobSpec {
            destination: format!(
                "{}/{}/{}",
                self.config.output_prefix, metadata.property_id, metadata.render_job_id
            ),
            metadata,
            frame_rate: fps,
            width: self.config.frame.width,
            height: self.config.frame.height,
            inputs,
            captions: (!overlays.is_empty()).then_some(captions.xml),
            fallback_font: captions.dominant_font.as_str().to_string(),
            callback_url: self.config.callback_url.clone(),
            total_duration: frames_to_timecode(seconds_to_frames(script.total_duration, fps), fps),
            overlays,
            requires_overlay_stage,
        }
    }

    /// Compile the script snapshot of a render job.
    pub fn compile_job(&self, job: &RenderJob) -> RenderJobSpec {
        self.compile(&job.script, JobMetadata::from(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use vreel_models::AssetId;

    fn clip(order: u32, start: f64, end: f64) -> Clip {
        Clip {
            source_asset: AssetId::from(format!("a{}", order)),
            source_url: format!("https://cdn/a{}.mp4", order),
            trim_start: start,
            trim_end: end,
            duration: end - start,
            order,
        }
    }

    fn meta() -> JobMetadata {
        JobMetadata {
            render_job_id: RenderJobId::from("rj-1"),
            video_id: VideoId::from("v-1"),
            property_id: "p-1".into(),
        }
    }

    fn script(clips: Vec<Clip>, overlays: Vec<TextOverlay>) -> CompositionScript {
        let total = clips.iter().map(|c| c.duration).sum();
        CompositionScript {
            clips,
            overlays,
            total_duration: total,
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        let script = script(
            vec![clip(0, 0.0, 2.4), clip(1, 2.4, 5.1), clip(2, 5.1, 7.77)],
            vec![TextOverlay::new("Welcome", 0.0, 2.0), TextOverlay::new("Pool", 2.5, 5.0)],
        );
        let compiler = RenderCompiler::default();
        let a = compiler.compile(&script, meta());
        let b = compiler.compile(&script, meta());
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_timeline_drift_stays_under_one_frame() {
        // durations of a third of a second never land on a frame boundary
        let clips: Vec<Clip> = (0..12)
            .map(|i| {
                let start = f64::from(i) * 0.3333;
                clip(i, start, start + 0.3333)
            })
            .collect();
        let script = script(clips, vec![]);
        let fps = 30;
        let spec = RenderCompiler::default().compile(&script, meta());

        let mut elapsed = 0.0;
        for (input, clip) in spec.inputs.iter().zip(&script.clips) {
            let exact = elapsed * f64::from(fps);
            let drift = exact - input.timeline_start_frame as f64;
            assert!(drift > -1e-6 && drift < 1.0, "drift {} at clip {}", drift, clip.order);
            elapsed += clip.duration;
        }
    }

    #[test]
    fn test_inverted_overlay_is_dropped() {
        let script = script(
            vec![clip(0, 0.0, 6.0)],
            vec![TextOverlay::new("Broken", 5.0, 3.0), TextOverlay::new("Fine", 1.0, 2.0)],
        );
        let spec = RenderCompiler::default().compile(&script, meta());

        assert_eq!(spec.overlays.len(), 1);
        let captions = spec.captions.unwrap();
        assert!(captions.contains("Fine"));
        assert!(!captions.contains("Broken"));
        assert!(spec.requires_overlay_stage);
    }

    #[test]
    fn test_no_overlays_means_single_stage() {
        let spec = RenderCompiler::default().compile(&script(vec![clip(0, 1.0, 3.5)], vec![]), meta());
        assert!(!spec.requires_overlay_stage);
        assert!(spec.captions.is_none());
        assert_eq!(spec.inputs[0].trim_start, "00:00:01:00");
        assert_eq!(spec.inputs[0].trim_end, "00:00:03:15");
        assert_eq!(spec.destination, "renders/p-1/rj-1");
    }

    #[test]
    fn test_engine_that_burns_text_skips_second_stage() {
        let compiler = RenderCompiler::new(CompilerConfig {
            engine_burns_text: true,
            ..CompilerConfig::default()
        });
        let spec = compiler.compile(
            &script(vec![clip(0, 0.0, 3.0)], vec![TextOverlay::new("Hi", 0.0, 1.0)]),
            meta(),
        );
        assert!(!spec.requires_overlay_stage);
        assert!(spec.captions.is_some());
    }

    #[test]
    fn test_clips_follow_order_field() {
        let spec = RenderCompiler::default().compile(
            &script(vec![clip(1, 0.0, 2.0), clip(0, 0.0, 1.0)], vec![]),
            meta(),
        );
        assert_eq!(spec.inputs[0].order, 0);
        assert_eq!(spec.inputs[1].timeline_start, "00:00:01:00");
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("RENDER_FRAME_RATE", "25");
        std::env::set_var("RENDER_ENGINE_BURNS_TEXT", "true");
        let config = CompilerConfig::from_env();
        assert_eq!(config.frame_rate, 25);
        assert!(config.engine_burns_text);
        std::env::remove_var("RENDER_FRAME_RATE");
        std::env::remove_var("RENDER_ENGINE_BURNS_TEXT");
    }
}
