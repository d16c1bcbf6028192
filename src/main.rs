// What you SEE:
// • Live camera inside a clear window, the rest darkened.
// • Corner brackets + a pulsing scan line sweeping the window; dots where a code was spotted.
// • When a QR code is read: beep, the window freezes on the code, and its link opens.
// • If nothing can open it, a notice appears at the bottom. Enter dismisses it and quits.
// • Switching away from the window pauses the camera; coming back resumes. ESC quits.

use std::time::Instant;

use log::{error, info};

use qr_capture::draw::{composite, draw_notice, Drawer};
use qr_capture::{
    BeepFeedback, CaptureSession, Collaborators, Error, FrameBuffer, InactivityTimer,
    MessageQueue, NokhwaDriver, QrDecoder, ScanConfig, Surface, SystemOpener, SystemPermission,
    ThreadedWorkerFactory,
};

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ScanConfig::from_env();
    let (w, h) = (config.surface_width as usize, config.surface_height as usize);

    /* --- Session + collaborators ---
       Visual: nothing yet; the camera opens once the window (surface) exists. */
    let queue = MessageQueue::new();
    let watchdog = InactivityTimer::spawn(config.idle_timeout, queue.sender())?;
    let parts = Collaborators {
        camera: Box::new(NokhwaDriver::new(config.camera_index)),
        workers: Box::new(ThreadedWorkerFactory::new(QrDecoder::new)),
        watchdog: Box::new(watchdog),
        feedback: Box::new(BeepFeedback::new(config.muted, config.beep_volume, config.vibrate_duration)),
        resolver: Box::new(SystemOpener::new(config.schemes.clone())),
        permission: Box::new(SystemPermission),
    };
    let mut session = CaptureSession::new(&config, queue, parts);

    session.on_create();
    session.on_resume(config.decode_hints());

    /* --- Window = preview surface --- */
    let mut drawer = Drawer::new("QR Capture", w, h)?;
    session.on_surface_created(Surface { width: w as u32, height: h as u32 });

    /* --- Reusable buffers ---
       `screen` is what you see; `overlay` is the transparent viewfinder layer on top. */
    let mut screen = FrameBuffer::new(w, h, 0);
    let mut overlay = FrameBuffer::new(w, h, 0);
    let mut focused = true;

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() && !session.is_finished() {
        /* 1) Focus changes drive pause/resume. */
        let active = drawer.is_active();
        if active != focused {
            focused = active;
            if focused {
                session.on_resume(config.decode_hints());
            } else {
                session.on_pause();
            }
        }

        /* 2) Deliver worker/watchdog messages (points, results, timeouts). */
        session.pump();

        /* 3) Notice acknowledged → screen ends. */
        if session.notice().is_some() && drawer.enter_pressed_once() {
            session.acknowledge_notice();
        }

        /* 4) Viewfinder redraws only when it asked to (every 100ms while live). */
        session.render(&mut overlay, Instant::now());

        /* 5) Camera picture, overlay, notice. */
        if !session.copy_preview_into(&mut screen) && !session.viewfinder().is_frozen() {
            screen.clear(0);
        }
        composite(&mut screen, &overlay);
        if let Some(notice) = session.notice() {
            draw_notice(&mut screen, &notice.message, "Press Enter");
        }

        /* 6) Present to the window. */
        if let Err(e) = drawer.present(&screen) {
            error!("{e}");
            break;
        }
    }

    session.on_surface_destroyed();
    session.on_pause();
    session.on_destroy();
    if let Some(outcome) = session.outcome() {
        info!("scanner closed: {outcome:?}");
    }
    Ok(())
}
