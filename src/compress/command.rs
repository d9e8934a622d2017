// Transcode command construction — a settings snapshot becomes a
// deterministic argument vector.

use crate::config::{
    AUDIO_BITRATE_KBPS, AUDIO_CHANNELS, INPUT_FILE_NAME, MAX_COMPRESSED_SIZE_MB,
    MAX_DURATION_SECONDS, OUTPUT_FILE_NAME,
};
use crate::settings::CompressionSettings;

/// Bitrate ceiling in kbps: the configured target, bounded by what the
/// output size budget allows over the assumed maximum duration.
pub fn bounded_bitrate_kbps(settings: &CompressionSettings) -> u64 {
    let duration_cap = MAX_COMPRESSED_SIZE_MB * 8192 / MAX_DURATION_SECONDS;
    (settings.target_bitrate_kbps as u64).min(duration_cap)
}

/// Scale+pad filter: bound both dimensions to the configured maximums while
/// preserving aspect ratio, then round each output dimension up to the next
/// even number (4:2:0 chroma subsampling requires even dimensions).
pub fn scale_pad_filter(settings: &CompressionSettings) -> String {
    format!(
        "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease,\
         pad='ceil(iw/2)*2':'ceil(ih/2)*2'",
        settings.max_width, settings.max_height
    )
}

/// Output dimensions the scale+pad filter produces for a given source size:
/// proportional downscale (never upscale), each dimension rounded up to even.
/// Pure mirror of [`scale_pad_filter`] for UIs and tests.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = f64::min(
        1.0,
        f64::min(
            max_width as f64 / width.max(1) as f64,
            max_height as f64 / height.max(1) as f64,
        ),
    );

    let round_up_even = |v: f64| -> u32 {
        let v = v.ceil() as u32;
        v + (v % 2)
    };

    (
        round_up_even(width as f64 * scale),
        round_up_even(height as f64 * scale),
    )
}

/// Assemble the full transcode argv for one run. Widely-supported H.264 +
/// AAC in an MP4 container with metadata stripped and the index moved up
/// front for progressive playback.
pub fn build_compression_command(settings: &CompressionSettings) -> Vec<String> {
    let bitrate = bounded_bitrate_kbps(settings);

    let args: Vec<String> = vec![
        "-i".into(),
        INPUT_FILE_NAME.into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-preset".into(),
        "medium".into(),
        "-crf".into(),
        settings.crf.to_string(),
        "-maxrate".into(),
        format!("{bitrate}k"),
        "-bufsize".into(),
        format!("{}k", bitrate * 2),
        "-vf".into(),
        scale_pad_filter(settings),
        "-r".into(),
        settings.frame_rate.to_string(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{AUDIO_BITRATE_KBPS}k"),
        "-ac".into(),
        AUDIO_CHANNELS.to_string(),
        "-map_metadata".into(),
        "-1".into(),
        "-metadata:s:v:0".into(),
        "rotate=0".into(),
        "-f".into(),
        "mp4".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-y".into(),
        OUTPUT_FILE_NAME.into(),
    ];

    args
}
