/// ffmpeg integration tests
/// Runs both loudnorm passes for real; every test skips itself without ffmpeg
mod common;

use common::create_sine_wav;
use loudeq_loudness::{
    BatchEqualizer, EqualizerConfig, FfmpegTool, LoudnessError, LoudnessMeasurer,
    LoudnessNormalizer, LoudnessTool, NormalizationTarget,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to check if FFmpeg is available
async fn ffmpeg_tool() -> Option<Arc<FfmpegTool>> {
    let tool = Arc::new(FfmpegTool::new("ffmpeg"));
    if tool.is_available().await {
        Some(tool)
    } else {
        eprintln!("Skipping test: FFmpeg not available");
        None
    }
}

#[tokio::test]
async fn test_measure_real_file() {
    let Some(tool) = ffmpeg_tool().await else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("tone.wav");
    create_sine_wav(&input, 0.05, 5).unwrap();

    let stats = LoudnessMeasurer::new(tool).measure(&input).await.unwrap();
    let lufs = stats.integrated_lufs().expect("finite loudness");
    assert!((-40.0..-20.0).contains(&lufs), "unexpected loudness {lufs}");
}

#[tokio::test]
async fn test_normalize_reaches_target() {
    let Some(tool) = ffmpeg_tool().await else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("tone.wav");
    let output = temp_dir.path().join("equalized_tone.wav");
    create_sine_wav(&input, 0.05, 5).unwrap();

    let normalizer = LoudnessNormalizer::new(tool.clone());
    normalizer
        .normalize(&input, &output, &NormalizationTarget::default())
        .await
        .unwrap();
    assert!(output.exists());

    let stats = LoudnessMeasurer::new(tool).measure(&output).await.unwrap();
    let lufs = stats.integrated_lufs().unwrap();
    assert!((lufs - -23.0).abs() < 1.0, "output loudness {lufs} LUFS");
}

/// Normalizing an already-normalized file barely changes it
#[tokio::test]
async fn test_renormalization_converges() {
    let Some(tool) = ffmpeg_tool().await else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("tone.wav");
    let first = temp_dir.path().join("first.wav");
    let second = temp_dir.path().join("second.wav");
    create_sine_wav(&input, 0.2, 5).unwrap();

    let normalizer = LoudnessNormalizer::new(tool.clone());
    let target = NormalizationTarget::default();
    normalizer.normalize(&input, &first, &target).await.unwrap();
    normalizer.normalize(&first, &second, &target).await.unwrap();

    let measurer = LoudnessMeasurer::new(tool);
    let first_lufs = measurer.measure(&first).await.unwrap().integrated_lufs().unwrap();
    let second_lufs = measurer.measure(&second).await.unwrap().integrated_lufs().unwrap();
    assert!(
        (first_lufs - second_lufs).abs() < 0.5,
        "{first_lufs} vs {second_lufs}"
    );
}

/// A file that is not audio fails analysis instead of yielding empty statistics
#[tokio::test]
async fn test_non_audio_file_fails_analysis() {
    let Some(tool) = ffmpeg_tool().await else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("notes.mp3");
    std::fs::write(&input, b"this is not audio").unwrap();

    let err = LoudnessMeasurer::new(tool).measure(&input).await.unwrap_err();
    assert!(matches!(err, LoudnessError::Analysis { .. }));
}

#[tokio::test]
async fn test_batch_with_real_ffmpeg() {
    let Some(tool) = ffmpeg_tool().await else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("good.wav");
    let bad = temp_dir.path().join("bad.wav");
    create_sine_wav(&good, 0.1, 4).unwrap();
    std::fs::write(&bad, b"garbage").unwrap();
    let output_dir = temp_dir.path().join("out");

    let equalizer = BatchEqualizer::new(tool, EqualizerConfig::default());
    let result = equalizer
        .equalize_volumes(&[bad.clone(), good.clone()], &output_dir)
        .await
        .unwrap();

    assert_eq!(result.succeeded, vec![output_dir.join("equalized_good.wav")]);
    assert_eq!(result.failures().count(), 1);
    assert_eq!(result.failures().next().unwrap().file_name, "bad.wav");
}

#[tokio::test]
async fn test_probe_file_info() {
    let Some(tool) = ffmpeg_tool().await else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("tone.wav");
    create_sine_wav(&input, 0.1, 2).unwrap();

    // ffprobe usually ships with ffmpeg, but not always
    let Ok(info) = tool.probe_file(&input).await else {
        eprintln!("Skipping test: ffprobe not available");
        return;
    };
    assert_eq!(info.sample_rate, Some(44100));
    assert_eq!(info.channels, Some(1));
    assert!((1900..=2100).contains(&info.duration_ms));
}
