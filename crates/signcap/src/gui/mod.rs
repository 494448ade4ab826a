//! Preview windows.
//!
//! Most windowing systems require the event loop to run on the main thread, so [`run`] takes over
//! the main thread and runs application code on a second thread. The `#[signcap::main]` attribute
//! sets this up.
//!
//! Application code talks to the event loop through [`GuiPreview`] handles: frames are sent to the
//! event loop, key presses and close requests are sent back over a channel.

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Context};
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::WindowId,
};

use crate::capture::{KeyEvent, Preview};
use crate::image::{Image, Resolution};

use self::renderer::{Gpu, Renderer};

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    listeners: HashMap<String, Sender<KeyEvent>>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new(gpu: Gpu) -> Self {
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            listeners: HashMap::new(),
            win_id_to_key: HashMap::new(),
        }
    }

    fn handle_msg(&mut self, msg: Msg, target: &EventLoopWindowTarget<Msg>) {
        match msg {
            Msg::Listen { key, sender } => {
                self.listeners.insert(key, sender);
            }
            Msg::Image { key, res, data } => {
                if !self.windows.contains_key(&key) {
                    log::debug!("creating window '{key}' at {res}");
                    match Renderer::open(target, &key, res, self.gpu.clone()) {
                        Ok(renderer) => {
                            self.win_id_to_key
                                .insert(renderer.window().id(), key.clone());
                            self.windows.insert(key.clone(), renderer);
                        }
                        Err(e) => {
                            log::error!("failed to open window '{key}': {e:#}");
                            self.notify(&key, KeyEvent::Closed);
                            return;
                        }
                    }
                }

                if let Some(renderer) = self.windows.get_mut(&key) {
                    renderer.upload(res, &data);
                    renderer.window().request_redraw();
                }
            }
            Msg::Close { key } => {
                self.close_window(&key);
                self.listeners.remove(&key);
            }
        }
    }

    fn handle_window_event(&mut self, id: WindowId, event: WindowEvent<'_>) {
        let Some(key) = self.win_id_to_key.get(&id).cloned() else {
            return;
        };
        match event {
            WindowEvent::ReceivedCharacter(c) => self.notify(&key, KeyEvent::Char(c)),
            WindowEvent::CloseRequested => {
                log::debug!("window '{key}' closed by user");
                self.close_window(&key);
                self.notify(&key, KeyEvent::Closed);
            }
            _ => {}
        }
    }

    fn notify(&mut self, key: &str, event: KeyEvent) {
        if let Some(sender) = self.listeners.get(key) {
            if sender.send(event).is_err() {
                // The preview handle is gone.
                self.listeners.remove(key);
            }
        }
    }

    fn close_window(&mut self, key: &str) {
        if let Some(renderer) = self.windows.remove(key) {
            self.win_id_to_key.remove(&renderer.window().id());
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(msg) => self.handle_msg(msg, target),
                Event::WindowEvent { window_id, event } => {
                    self.handle_window_event(window_id, event)
                }
                Event::RedrawRequested(id) => {
                    if let Some(renderer) = self
                        .win_id_to_key
                        .get(&id)
                        .and_then(|key| self.windows.get_mut(key))
                    {
                        renderer.redraw();
                    }
                }
                _ => {}
            }
        })
    }
}

#[derive(Debug)]
enum Msg {
    Listen {
        key: String,
        sender: Sender<KeyEvent>,
    },
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
    Close {
        key: String,
    },
}

static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();

fn send(msg: Msg) -> anyhow::Result<()> {
    let proxy = PROXY
        .get()
        .context("GUI is not running (use `#[signcap::main]`)")?;
    proxy
        .lock()
        .map_err(|_| anyhow!("GUI proxy lock poisoned"))?
        .send_event(msg)
        .map_err(|_closed| anyhow!("GUI event loop has exited"))
}

/// Runs `cb` on a new thread while the GUI event loop runs on the calling thread.
///
/// The process exits when `cb` returns: with status 0 if it returned `Ok`, and with status 1 after
/// logging the error chain if it returned `Err`. A panic in `cb` exits with status 101.
///
/// This must be called from the main thread. Usually it's invoked by `#[signcap::main]`.
pub fn run<F>(cb: F) -> !
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        log::error!("`gui::run` called twice");
        process::exit(1);
    }

    let gpu = match pollster::block_on(Gpu::open()) {
        Ok(gpu) => gpu,
        Err(e) => {
            log::error!("failed to initialize graphics: {e:#}");
            process::exit(1);
        }
    };

    std::thread::spawn(move || match catch_unwind(AssertUnwindSafe(cb)) {
        Ok(Ok(())) => process::exit(0),
        Ok(Err(e)) => {
            log::error!("{e:?}");
            process::exit(1);
        }
        // The panic hook has printed the message already; 101 mirrors libstd.
        Err(_payload) => process::exit(101),
    });

    Gui::new(gpu).run(event_loop)
}

/// A preview window, created lazily when the first frame is shown.
pub struct GuiPreview {
    key: String,
    events: Receiver<KeyEvent>,
    closed: bool,
}

impl GuiPreview {
    /// Creates a preview window titled `title`.
    ///
    /// Titles identify windows, so two previews with the same title share a window.
    pub fn open(title: impl Into<String>) -> anyhow::Result<Self> {
        let key = title.into();
        let (sender, events) = mpsc::channel();
        send(Msg::Listen {
            key: key.clone(),
            sender,
        })?;
        Ok(Self {
            key,
            events,
            closed: false,
        })
    }
}

impl Preview for GuiPreview {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        // Images are RGBA8 internally, so they can be uploaded without conversion.
        send(Msg::Image {
            key: self.key.clone(),
            res: image.resolution(),
            data: image.data().to_vec(),
        })
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<KeyEvent> {
        if self.closed {
            return Some(KeyEvent::Closed);
        }
        let event = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => KeyEvent::Closed,
        };
        if event == KeyEvent::Closed {
            self.closed = true;
        }
        Some(event)
    }

    fn close(&mut self) {
        if let Err(e) = send(Msg::Close {
            key: self.key.clone(),
        }) {
            log::debug!("failed to close preview window: {e:#}");
        }
        self.closed = true;
    }
}
