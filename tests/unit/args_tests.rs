//! Unit tests for `ArgumentBuilder` token order, defaults, and per-target
//! output clauses.

use std::fmt::Arguments;
use std::path::Path;
use std::sync::Mutex;

use live_transmux::args::ArgumentBuilder;
use live_transmux::config::{DynamicValue, OutputTarget, SessionConfig, TargetKind};
use live_transmux::logger::{LogLevel, SessionLogger};

#[derive(Default)]
struct Notices(Mutex<Vec<(LogLevel, String)>>);

impl SessionLogger for Notices {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.0.lock().unwrap().push((level, args.to_string()));
    }
}

fn build(config: &SessionConfig, directory: &str) -> Vec<String> {
    ArgumentBuilder::new(config, Path::new(directory)).build(&Notices::default())
}

fn base() -> SessionConfig {
    SessionConfig::new("live", "cam1")
}

#[test]
fn no_targets_produce_no_output_clauses() {
    let config = base();
    let directory = Path::new("/out/cam1");
    let builder = ArgumentBuilder::new(&config, directory);

    let args = builder.build(&Notices::default());

    assert!(builder.outputs().is_empty(), "no filenames may be requested");
    assert!(!args.iter().any(|a| a == "-map"));
    assert!(!args.iter().any(|a| a == "-f"));
}

#[test]
fn default_invocation_matches_fixed_order() {
    let config = base();
    let args = build(&config, "/out/cam1");

    assert_eq!(
        args,
        vec![
            "-threads",
            "0",
            "-loglevel",
            "error",
            "-nostdin",
            "-hide_banner",
            "-nostats",
            "-y",
            "-analyzeduration",
            "1000000",
            "-i",
            "rtmp://127.0.0.1:1935/live/cam1",
            "-timeout",
            "30",
            "-c:v",
            "copy",
            "-c:a",
            "aac",
        ]
    );
}

#[test]
fn mp4_default_filename_ends_invocation() {
    let config = base().with_target(TargetKind::Mp4, OutputTarget::default());
    let args = build(&config, "/out/cam1");

    let tail: Vec<&str> = args[args.len() - 7..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec!["-map", "0:a?", "-map", "0:v?", "-f", "mp4", "/out/cam1/index.mp4"]
    );
}

#[test]
fn targets_are_emitted_in_mp4_hls_dash_order() {
    let config = base()
        .with_target(TargetKind::Dash, OutputTarget::default())
        .with_target(TargetKind::Hls, OutputTarget::default())
        .with_target(TargetKind::Mp4, OutputTarget::default());
    let args = build(&config, "/out/cam1");

    let formats: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "-f")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(formats, vec!["mp4", "hls", "dash"]);
    assert_eq!(args.iter().filter(|a| *a == "-map").count(), 6);
    assert_eq!(args.last().map(String::as_str), Some("/out/cam1/index.mpd"));
}

#[test]
fn disabled_target_contributes_nothing() {
    let config = base()
        .with_target(TargetKind::Mp4, OutputTarget::disabled())
        .with_target(TargetKind::Hls, OutputTarget::default());
    let directory = Path::new("/out/cam1");
    let builder = ArgumentBuilder::new(&config, directory);

    let outputs = builder.outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].kind, TargetKind::Hls);
    assert_eq!(outputs[0].filename, "/out/cam1/index.m3u8");
    assert!(!builder.build(&Notices::default()).contains(&"mp4".to_owned()));
}

#[test]
fn target_flags_precede_format_flag() {
    let config = base().with_target(
        TargetKind::Hls,
        OutputTarget::default()
            .with_flags("-hls_time 2 -hls_list_size 3")
            .with_filename("live.m3u8"),
    );
    let args = build(&config, "/out/cam1");

    let tail: Vec<&str> = args[args.len() - 11..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            "-map",
            "0:a?",
            "-map",
            "0:v?",
            "-hls_time",
            "2",
            "-hls_list_size",
            "3",
            "-f",
            "hls",
            "/out/cam1/live.m3u8",
        ]
    );
}

#[test]
fn computed_filename_receives_config() {
    let config = base().with_target(
        TargetKind::Dash,
        OutputTarget::default().with_filename(DynamicValue::computed(|c| format!("{}.mpd", c.stream))),
    );
    assert_eq!(build(&config, "/d").last().map(String::as_str), Some("/d/cam1.mpd"));
}

#[test]
fn caller_flags_surround_input_clause() {
    let mut config = base();
    config.input_flags = Some("-re -fflags nobuffer".into());
    config.output_flags = Some(vec!["-movflags".to_owned(), "faststart".to_owned()].into());
    let args = build(&config, "/out/cam1");

    let input = args.iter().position(|a| a == "-i").unwrap();
    assert_eq!(&args[input - 3..input], ["-re", "-fflags", "nobuffer"]);
    let audio = args.iter().position(|a| a == "-c:a").unwrap();
    assert_eq!(&args[audio + 2..audio + 4], ["-movflags", "faststart"]);
}

#[test]
fn global_overrides_are_applied() {
    let mut config = base();
    config.threads = 4;
    config.loglevel = Some("warning".into());
    config.analyzeduration = Some(500_000);
    config.vc = Some("libx264".into());
    config.ac = Some("libopus".into());
    config.port = 19350;
    let args = build(&config, "/out/cam1");

    assert_eq!(args[1], "4");
    assert_eq!(args[3], "warning");
    assert_eq!(args[9], "500000");
    assert_eq!(args[11], "rtmp://127.0.0.1:19350/live/cam1");
    assert_eq!(args[15], "libx264");
    assert_eq!(args[17], "libopus");
}

#[test]
fn audio_copy_switch_overrides_audio_codec() {
    let mut config = base();
    config.ac = Some("libopus".into());
    config.args.insert("ac".into(), serde_json::json!(10));
    let args = build(&config, "/out/cam1");
    assert_eq!(args[17], "copy");

    config.args.insert("ac".into(), serde_json::json!("10"));
    assert_eq!(build(&config, "/out/cam1")[17], "copy");

    config.args.insert("ac".into(), serde_json::json!(2));
    assert_eq!(build(&config, "/out/cam1")[17], "libopus");
}

#[test]
fn transmuxing_notice_is_logged_per_target() {
    let config = base()
        .with_target(TargetKind::Mp4, OutputTarget::default())
        .with_target(TargetKind::Hls, OutputTarget::default());
    let notices = Notices::default();
    let _ = ArgumentBuilder::new(&config, Path::new("/out/cam1")).build(&notices);

    let records = notices.0.lock().unwrap().clone();
    assert_eq!(
        records,
        vec![
            (
                LogLevel::Info,
                "[Transmuxing MP4] /live/cam1 to /out/cam1/index.mp4".to_owned()
            ),
            (
                LogLevel::Info,
                "[Transmuxing HLS] /live/cam1 to /out/cam1/index.m3u8".to_owned()
            ),
        ]
    );
}
