use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use fortune_cam::config::{CameraKind, Config};
use fortune_cam::controller::NO_RESULT_PLACEHOLDER;
use fortune_cam::{
    dispatch, AnalysisService, CameraHandle, FrameCropper, HttpAnalysisService, ManualOrientation,
    OrientationMonitor, OrientationQuery, ResultBody, Revealer, SessionController, SessionView,
    StillFileSource, TestPatternSource, UnavailableOrientation, VideoSource, ViewEffect,
};

const HELP: &str = "commands: capture | retake | submit | rotate | status | help | quit";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting fortune-cam");

    let config = Config::load()?;
    config.validate()?;
    info!(
        "Configuration loaded: {:?} camera, service at {}",
        config.camera.kind, config.service.endpoint
    );

    let manual = config
        .capture
        .initial_orientation
        .mode()
        .map(|mode| Arc::new(ManualOrientation::new(mode)));
    let query: Arc<dyn OrientationQuery> = match &manual {
        Some(manual) => Arc::clone(manual) as Arc<dyn OrientationQuery>,
        None => Arc::new(UnavailableOrientation) as Arc<dyn OrientationQuery>,
    };

    let camera = CameraHandle::acquire(open_camera(&config)?);
    let service: Arc<dyn AnalysisService> = Arc::new(
        HttpAnalysisService::new(config.service.endpoint.clone(), config.service_timeout())
            .context("Failed to build HTTP client")?,
    );

    let mut controller = SessionController::new(
        OrientationMonitor::attach(query),
        camera,
        FrameCropper::new(config.capture.jpeg_quality),
        Revealer::new(config.cadence()),
    );

    run(&mut controller, manual.as_deref(), service).await?;

    info!("Application shut down gracefully");
    Ok(())
}

fn open_camera(config: &Config) -> Result<Box<dyn VideoSource>> {
    let source: Box<dyn VideoSource> = match config.camera.kind {
        CameraKind::TestPattern => Box::new(TestPatternSource::with_warmup(
            config.camera.width,
            config.camera.height,
            config.camera_warmup(),
        )),
        CameraKind::File => {
            let path = config
                .camera
                .file
                .as_ref()
                .context("camera.file is required for the file camera")?;
            Box::new(StillFileSource::open(path)?)
        }
        #[cfg(feature = "libcamera")]
        CameraKind::Libcamera => Box::new(fortune_cam::camera_controller::LibcameraSource::new(
            config.camera.width,
            config.camera.height,
        )),
        #[cfg(not(feature = "libcamera"))]
        CameraKind::Libcamera => {
            return Err(anyhow::anyhow!("built without libcamera support"));
        }
    };
    Ok(source)
}

async fn run(
    controller: &mut SessionController,
    orientation: Option<&ManualOrientation>,
    service: Arc<dyn AnalysisService>,
) -> Result<()> {
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    let mut reveal_rx = controller.subscribe_reveal();
    let mut orientation_rx = controller.subscribe_orientation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);
    render(&controller.view());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "capture" => {
                        let _ = controller.capture();
                    }
                    "retake" => controller.retake(),
                    "submit" => {
                        if let Ok(request) = controller.submit() {
                            dispatch(Arc::clone(&service), request, reply_tx.clone());
                        }
                    }
                    "rotate" => match orientation {
                        Some(manual) => {
                            manual.rotate();
                        }
                        None => println!("orientation is fixed on this device"),
                    },
                    "status" => {}
                    "help" => println!("{}", HELP),
                    "quit" | "exit" => break,
                    "" => continue,
                    other => {
                        println!("unknown command '{}'. {}", other, HELP);
                        continue;
                    }
                }
                apply_effects(controller);
                render(&controller.view());
            }
            Some(reply) = reply_rx.recv() => {
                controller.handle_reply(reply);
                apply_effects(controller);
                render(&controller.view());
            }
            Ok(()) = reveal_rx.changed() => {
                let _ = reveal_rx.borrow_and_update();
                render(&controller.view());
            }
            Ok(()) = orientation_rx.changed() => {
                let mode = *orientation_rx.borrow_and_update();
                println!("[orientation: {}]", mode);
            }
        }
    }

    Ok(())
}

fn apply_effects(controller: &mut SessionController) {
    for effect in controller.take_effects() {
        match effect {
            ViewEffect::ScrollToCapture => println!("-- capture --"),
            ViewEffect::ScrollToResult => println!("-- result --"),
        }
    }
}

fn render(view: &SessionView) {
    println!(
        "[{:?} | {} {}x{}{}]",
        view.status,
        view.orientation,
        view.target.width,
        view.target.height,
        if view.revealing { " | revealing" } else { "" }
    );
    if let Some(error) = &view.error {
        println!("! {}", error);
    }
    match &view.body {
        ResultBody::Loading => println!("analysing your photo..."),
        ResultBody::Html(html) => println!("{}", html),
        ResultBody::Placeholder => println!("{}", NO_RESULT_PLACEHOLDER),
    }
}
