//! Cross-fade concat filter graphs.
//!
//! Builds the `-filter_complex` expression that joins generated clips into
//! one timeline with a short fade across each boundary. Inputs are
//! normalized to a common frame rate and timebase first; `xfade` rejects
//! mismatched timebases.

use reel_models::encoding::OUTPUT_FPS;

use crate::error::{MediaError, MediaResult};

/// A built filter graph plus its output pad labels.
#[derive(Debug, Clone)]
pub struct CrossfadeGraph {
    /// The `-filter_complex` expression
    pub filter: String,
    /// Label of the final video pad (e.g. "vout")
    pub video_out: String,
    /// Label of the final audio pad, when audio is stitched
    pub audio_out: Option<String>,
    /// Resulting timeline duration in seconds
    pub total_duration: f64,
}

/// Build a cross-fade graph over `durations.len()` inputs.
///
/// `fade` is the overlap between adjacent clips in seconds; with `fade <= 0`
/// the clips are butt-joined with the plain `concat` filter instead. Audio
/// is stitched with `acrossfade`/`concat` only when `with_audio` is set;
/// the caller must have verified that every input actually has an audio
/// stream.
pub fn build_crossfade_graph(
    durations: &[f64],
    fade: f64,
    with_audio: bool,
) -> MediaResult<CrossfadeGraph> {
    if durations.len() < 2 {
        return Err(MediaError::invalid_video(
            "cross-fade graph needs at least two clips",
        ));
    }
    if let Some(bad) = durations.iter().find(|d| **d <= 0.0) {
        return Err(MediaError::invalid_video(format!(
            "clip with non-positive duration {bad}"
        )));
    }
    if fade > 0.0 {
        let shortest = durations.iter().cloned().fold(f64::INFINITY, f64::min);
        if fade >= shortest {
            return Err(MediaError::invalid_video(format!(
                "fade {fade}s is not shorter than the shortest clip ({shortest}s)"
            )));
        }
    }

    let n = durations.len();
    let mut parts: Vec<String> = Vec::new();

    // Normalize every video input to a shared fps/timebase.
    for i in 0..n {
        parts.push(format!("[{i}:v]fps={OUTPUT_FPS},settb=AVTB[nv{i}]"));
    }

    if fade <= 0.0 {
        return Ok(build_plain_concat(durations, with_audio, parts));
    }

    // Chain xfades: each boundary starts `fade` seconds before the end of
    // the timeline built so far.
    let mut offset = 0.0f64;
    let mut prev = "nv0".to_string();
    for i in 1..n {
        offset += durations[i - 1] - fade;
        let out = format!("vx{i}");
        parts.push(format!(
            "[{prev}][nv{i}]xfade=transition=fade:duration={fade:.3}:offset={offset:.3}[{out}]"
        ));
        prev = out;
    }
    let video_out = prev;

    let audio_out = if with_audio {
        let mut prev = "0:a".to_string();
        for i in 1..n {
            let out = format!("ax{i}");
            parts.push(format!("[{prev}][{i}:a]acrossfade=d={fade:.3}[{out}]"));
            prev = out;
        }
        Some(prev)
    } else {
        None
    };

    let total_duration =
        durations.iter().sum::<f64>() - fade * (n as f64 - 1.0);

    Ok(CrossfadeGraph {
        filter: parts.join(";"),
        video_out,
        audio_out,
        total_duration,
    })
}

fn build_plain_concat(
    durations: &[f64],
    with_audio: bool,
    mut parts: Vec<String>,
) -> CrossfadeGraph {
    let n = durations.len();

    let mut concat_inputs = String::new();
    for i in 0..n {
        concat_inputs.push_str(&format!("[nv{i}]"));
        if with_audio {
            concat_inputs.push_str(&format!("[{i}:a]"));
        }
    }

    let (av_flags, audio_out) = if with_audio {
        ("v=1:a=1[vcat][acat]", Some("acat".to_string()))
    } else {
        ("v=1:a=0[vcat]", None)
    };
    parts.push(format!("{concat_inputs}concat=n={n}:{av_flags}"));

    CrossfadeGraph {
        filter: parts.join(";"),
        video_out: "vcat".to_string(),
        audio_out,
        total_duration: durations.iter().sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_clip_offsets() {
        let graph = build_crossfade_graph(&[8.0, 6.0], 0.5, true).unwrap();

        assert!(graph.filter.contains("xfade=transition=fade:duration=0.500:offset=7.500"));
        assert!(graph.filter.contains("acrossfade=d=0.500"));
        assert_eq!(graph.video_out, "vx1");
        assert_eq!(graph.audio_out.as_deref(), Some("ax1"));
        assert!((graph.total_duration - 13.5).abs() < 1e-9);
    }

    #[test]
    fn test_offsets_accumulate() {
        let graph = build_crossfade_graph(&[8.0, 6.0, 4.0], 0.5, false).unwrap();

        // Boundary 1 at 7.5, boundary 2 at 7.5 + 6.0 - 0.5 = 13.0.
        assert!(graph.filter.contains("offset=7.500"));
        assert!(graph.filter.contains("offset=13.000"));
        assert!(graph.audio_out.is_none());
        assert!((graph.total_duration - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_fade_uses_concat() {
        let graph = build_crossfade_graph(&[8.0, 6.0], 0.0, true).unwrap();

        assert!(graph.filter.contains("concat=n=2:v=1:a=1"));
        assert_eq!(graph.video_out, "vcat");
        assert_eq!(graph.audio_out.as_deref(), Some("acat"));
        assert!((graph.total_duration - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_fade_longer_than_clip_rejected() {
        let err = build_crossfade_graph(&[8.0, 0.4], 0.5, false).unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[test]
    fn test_single_clip_rejected() {
        assert!(build_crossfade_graph(&[8.0], 0.5, false).is_err());
    }

    #[test]
    fn test_inputs_normalized() {
        let graph = build_crossfade_graph(&[8.0, 6.0], 0.5, false).unwrap();
        assert!(graph.filter.contains("[0:v]fps=24,settb=AVTB[nv0]"));
        assert!(graph.filter.contains("[1:v]fps=24,settb=AVTB[nv1]"));
    }
}
