use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc::sync_channel;
use std::time::Duration;

use structopt::StructOpt;

use bootloader_can::{rccp_reset_frame, SocketCanInterface};
use bootloader_core::can::CanInterface;
use bootloader_core::dispatcher;
use bootloader_core::driver::{self, BootloaderEntryHook};
use bootloader_core::error::BootloaderError;
use bootloader_core::image;
use bootloader_core::progress::{ProgressSink, ProgressState};
use bootloader_core::{Board, Session};

/// Flash an AVR target running the CAN-bus resident bootloader.
#[derive(StructOpt, Debug)]
#[structopt(name = "avr-can-bootloader")]
struct Opt {
    /// 8-bit identifier of the target board
    #[structopt(short, long)]
    board_id: u8,

    /// CAN interface name, e.g. can0 or vcan0
    #[structopt(short, long, default_value = "can0")]
    interface: String,

    /// Intel HEX image to flash
    #[structopt(parse(from_os_str))]
    image: PathBuf,

    /// Enable verbose logging
    #[structopt(short, long)]
    debug: bool,

    /// Per-request timeout, in milliseconds, used while waiting for IDENTIFY
    #[structopt(long, default_value = "100")]
    timeout_ms: u64,

    /// Number of IDENTIFY attempts before retrying the bootloader-entry hook
    #[structopt(long, default_value = "10")]
    attempts: u32,
}

struct ResetHook<'a> {
    interface: &'a SocketCanInterface,
    board_id: u8,
}

impl<'a> BootloaderEntryHook for ResetHook<'a> {
    fn invoke(&self) -> Result<(), BootloaderError> {
        self.interface
            .send(&rccp_reset_frame(self.board_id))
            .map_err(BootloaderError::Transport)
    }
}

struct TerminalProgress {
    bar: indicatif::ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = indicatif::ProgressBar::new(100);
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{prefix} [{bar:40.cyan/blue}] {percent}%")
                .expect("static template is valid")
                .progress_chars("=> "),
        );
        TerminalProgress { bar }
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&self, state: ProgressState, progress: f32) {
        match state {
            ProgressState::Waiting => self.bar.set_prefix("connecting"),
            ProgressState::Start => {
                self.bar.set_prefix("flashing");
                self.bar.set_position(0);
            }
            ProgressState::InProgress => self.bar.set_position((progress * 100.0) as u64),
            ProgressState::End => {
                self.bar.set_position(100);
                self.bar.finish_with_message("done");
            }
            ProgressState::Error => self.bar.abandon_with_message("failed"),
        }
    }
}

fn run(opt: &Opt) -> Result<(), BootloaderError> {
    let source = fs::read_to_string(&opt.image)
        .map_err(|e| BootloaderError::ImageParse(format!("{}: {}", opt.image.display(), e)))?;
    let segments = image::parse(&source)?;

    let interface = SocketCanInterface::open(&opt.interface)
        .map_err(|e| BootloaderError::Transport(Box::new(e)))?;

    let (tx, rx) = sync_channel(64);
    dispatcher::attach(&interface, opt.board_id, tx);

    let mut session = Session::new(opt.board_id, &interface, rx);
    let mut board = Board::new(opt.board_id);
    let hook = ResetHook { interface: &interface, board_id: opt.board_id };
    let progress = TerminalProgress::new();

    driver::run(
        &mut session,
        &mut board,
        &hook,
        &segments,
        &progress,
        Duration::from_millis(opt.timeout_ms),
        opt.attempts,
    )
}

fn main() {
    let opt = Opt::from_args();

    if opt.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    if let Err(err) = run(&opt) {
        log::error!("{}", err);
        process::exit(1);
    }
}
