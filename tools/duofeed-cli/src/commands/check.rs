//! Check system capabilities.

use duofeed_common::config::AppConfig;
use duofeed_pipeline::device::list_video_devices;
use duofeed_pipeline::{element_available, negotiate, BackendCapability, DeviceValidator, GstProbe};

use crate::setup;

/// Elements every session graph uses regardless of codec or sink.
const PIPELINE_ELEMENTS: &[&str] = &[
    "v4l2src",
    "videocrop",
    "videoscale",
    "queue",
    "compositor",
    "capsfilter",
    "videoconvert",
];

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("DuoFeed System Check");
    println!("{}", "=".repeat(50));

    // Rendering backends
    let candidates = BackendCapability::from_config(&config.backends)?;
    println!("Rendering backends:");
    for candidate in &candidates {
        let status = if element_available(&candidate.factory) {
            "[OK]     "
        } else {
            "[MISSING]"
        };
        println!("  {status} {} ({})", candidate.factory, candidate.kind);
    }
    let backend = negotiate(&candidates, &GstProbe);
    match &backend {
        Ok(selected) => println!(
            "  Selected: {} ({:?})",
            selected.factory(),
            selected.embedding
        ),
        Err(e) => println!("  [ERROR] {e}"),
    }

    // Pipeline elements
    println!();
    println!("Pipeline elements:");
    let format = setup::capture_format(config)?;
    let decoders: &[&str] = match format.codec {
        duofeed_layout_model::CaptureCodec::Mjpeg => &["jpegdec"],
        duofeed_layout_model::CaptureCodec::Raw => &[],
        duofeed_layout_model::CaptureCodec::H264 => &["h264parse", "avdec_h264"],
    };
    let mut elements_ok = true;
    for element in PIPELINE_ELEMENTS.iter().chain(decoders) {
        let ok = element_available(element);
        elements_ok &= ok;
        println!("  {} {element}", if ok { "[OK]     " } else { "[MISSING]" });
    }

    // Capture devices
    println!();
    let validator = DeviceValidator::new(&config.device_root);
    let present = list_video_devices(validator.device_root());
    println!(
        "Video devices under {}: {}",
        validator.device_root().display(),
        present.len()
    );
    for path in &present {
        println!("     {}", path.display());
    }

    println!("Configured sources:");
    let mut sources_ok = true;
    for id in &config.sources {
        match validator.resolve(id) {
            Ok(path) => println!("  [OK]      {id} -> {}", path.display()),
            Err(e) => {
                sources_ok = false;
                println!("  [MISSING] {e}");
            }
        }
    }

    println!();
    if backend.is_ok() && elements_ok && sources_ok {
        println!("All required capabilities are available. DuoFeed is ready.");
    } else {
        println!("Some required capabilities are missing. See above for details.");
    }

    Ok(())
}
