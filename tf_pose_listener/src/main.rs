//! Reprojects the objects a camera detects into the arm's end effector frame.
//!
//! The robot's frames come from a toml scene file: static transforms are broadcast once,
//! moving ones at `--rate` Hz. Every detection is looked up at its own stamp, so it waits
//! for the producer to catch up (up to `--timeout` seconds) instead of extrapolating.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{arg, command};
use tf_core::{LookupError, TfBroadcaster, TfBuffer, TfListener, Time};
use tokio::sync::watch;

mod scene;

use scene::{Scene, ScenePose};

const QUEUE_SIZE: usize = 100;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let matches = command!()
        .arg(
            arg!(<SCENE> "toml file describing frames and detected objects")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(-t --"target-frame" <FRAME> "frame to express detections in")
                .default_value("arm_end_link")
                .required(false),
        )
        .arg(
            arg!(--timeout <SECONDS> "how long a lookup waits for transforms")
                .default_value("1.0")
                .value_parser(clap::value_parser!(f64))
                .required(false),
        )
        .arg(
            arg!(-r --rate <HZ> "rate of transform broadcasts and reprojections")
                .default_value("10.0")
                .value_parser(clap::value_parser!(f64))
                .required(false),
        )
        .arg(
            arg!(-l --"log-level" <LEVEL> "error, warn, info, debug or trace")
                .default_value("info")
                .value_parser(clap::value_parser!(log::LevelFilter))
                .required(false),
        )
        .get_matches();

    let log_level = *matches.get_one::<log::LevelFilter>("log-level").unwrap();
    simple_logger::SimpleLogger::new().with_level(log_level).init()?;

    let scene_path = matches.get_one::<PathBuf>("SCENE").unwrap();
    let target_frame = matches.get_one::<String>("target-frame").unwrap().clone();
    let timeout = Duration::try_from_secs_f64(*matches.get_one::<f64>("timeout").unwrap())?;
    let rate = *matches.get_one::<f64>("rate").unwrap();
    anyhow::ensure!(rate.is_finite() && rate > 0.0, "rate must be positive, got {rate}");
    let period = Duration::from_secs_f64(1.0 / rate);

    let scene = Arc::new(Scene::from_toml_file(scene_path)?);
    log::info!(
        "loaded {} transforms and {} objects from {}",
        scene.transforms.len(),
        scene.poses.len(),
        scene_path.display()
    );

    let buffer = Arc::new(TfBuffer::new_with_config(scene.buffer.clone()));
    let listener = TfListener::new_with_buffer(buffer.clone(), QUEUE_SIZE);

    listener
        .static_broadcaster()
        .send_transforms(scene.static_transforms())
        .await?;
    let producer = tokio::spawn(broadcast_scene(scene.clone(), listener.broadcaster(), period));

    let (stop_sender, mut stop) = watch::channel(false);
    tokio::spawn(shutdown_on_ctrl_c(buffer.clone(), stop_sender));

    // give the producer one period to publish the moving frames
    let mut update_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            Ok(()) = stop.changed() => break,
            _ = update_interval.tick() => {
                let stamp = Time::now();
                if !reproject_detections(&listener, &scene.poses, &target_frame, stamp, timeout).await {
                    break;
                }
            },
        }
    }

    producer.abort();
    log::debug!("{}", buffer.all_frames_as_string());
    Ok(())
}

/// Shuts the buffer down on ctrl-c, which also wakes lookups that are waiting right now.
async fn shutdown_on_ctrl_c(buffer: Arc<TfBuffer>, stop: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("could not listen for ctrl-c: {err}");
        return;
    }
    log::info!("ctrl-c exiting");
    buffer.shutdown();
    let _ = stop.send(true);
}

/// Logs every detection expressed in `target_frame`. Returns false once the buffer is shut down.
async fn reproject_detections(
    listener: &TfListener,
    poses: &[ScenePose],
    target_frame: &str,
    stamp: Time,
    timeout: Duration,
) -> bool {
    for object in poses {
        let detection = object.detected_at(stamp);
        match listener.transform_pose(&detection, target_frame, Some(timeout)).await {
            Ok(pose) => {
                let p = pose.pose.position;
                log::info!(
                    "Object '{}' pose in '{target_frame}' is: x,y,z = {:.1},{:.1},{:.1}",
                    object.name,
                    p.x,
                    p.y,
                    p.z
                );
            }
            Err(LookupError::Shutdown) => return false,
            Err(err) => {
                log::warn!(
                    "Could not find object '{}' position in '{target_frame}' frame: {err}",
                    object.name
                );
            }
        }
    }
    true
}

/// Publishes the moving part of the scene until the listener goes away.
async fn broadcast_scene(scene: Arc<Scene>, broadcaster: TfBroadcaster, period: Duration) {
    let start = Time::now();
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let stamp = Time::now();
        let elapsed = stamp.to_sec_f64() - start.to_sec_f64();
        let transforms = scene.dynamic_transforms(stamp, elapsed);
        if transforms.is_empty() {
            return;
        }
        if let Err(err) = broadcaster.send_transforms(transforms).await {
            log::warn!("stopped broadcasting the scene: {err}");
            return;
        }
    }
}
