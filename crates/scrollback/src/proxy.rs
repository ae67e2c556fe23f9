use crate::error::Side;
use crate::mux::{Channels, Multiplexer, Readiness};
use crate::ring::Geometry;
use crate::session::Session;
use anyhow::{Context, Result};
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::pty::{Winsize, openpty};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::termios::{SetArg, Termios, cfmakeraw, tcgetattr, tcsetattr};
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Set in the shell's environment so a nested instance can refuse to start.
pub const NESTED_ENV: &str = "SCROLLBACK";

/// Queued keyboard input past which the terminal is no longer read.
const MAX_PENDING_INPUT: usize = 64 * 1024;

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);
static SIGTERM_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_sigterm(_: libc::c_int) {
    SIGTERM_RECEIVED.store(true, Ordering::SeqCst);
}

pub struct Proxy {
    pty_master: OwnedFd,
    child: Child,
    original_termios: Option<Termios>,
}

impl Proxy {
    pub fn spawn(command: &str, args: &[&str], geometry: Geometry) -> Result<Self> {
        let winsize = Winsize {
            ws_row: geometry.rows as u16,
            ws_col: geometry.cols as u16,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(&winsize, None).context("openpty failed")?;

        let original_termios = setup_raw_mode()?;
        setup_signal_handlers()?;

        let slave_fd = pty.slave.as_raw_fd();

        let child = unsafe {
            Command::new(command)
                .args(args)
                .env(NESTED_ENV, "true")
                .pre_exec(move || {
                    if libc::setsid() == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if libc::ioctl(slave_fd, libc::TIOCSCTTY, 0) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if libc::dup2(slave_fd, 0) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if libc::dup2(slave_fd, 1) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if libc::dup2(slave_fd, 2) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if slave_fd > 2 {
                        libc::close(slave_fd);
                    }
                    Ok(())
                })
                .spawn()
                .with_context(|| format!("failed to run {}", command))?
        };

        drop(pty.slave);
        set_nonblocking(&pty.master)?;
        info!(command, pid = child.id(), rows = geometry.rows, cols = geometry.cols, "shell started");

        Ok(Self {
            pty_master: pty.master,
            child,
            original_termios,
        })
    }

    /// Proxy until one side closes, then wait for the shell and return its
    /// exit code.
    pub fn run(&mut self, session: Session) -> Result<i32> {
        let channels = PtyChannels {
            terminal_in: io::stdin().as_raw_fd(),
            terminal_out: io::stdout().as_raw_fd(),
            shell: self.pty_master.as_raw_fd(),
            child_pid: self.child.id(),
            pending: Vec::new(),
        };
        let mut mux = Multiplexer::new(channels, session);
        let closed = mux.run().context("proxy loop failed")?;
        debug!(%closed, "proxy loop finished");

        if closed == Side::Terminal {
            forward_signal(self.child.id(), Signal::SIGHUP);
        }
        self.wait_child()
    }

    fn wait_child(&mut self) -> Result<i32> {
        let status = self.child.wait().context("wait failed")?;
        info!(%status, "shell exited");
        Ok(exit_code_from_status(status))
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        if let Some(ref termios) = self.original_termios {
            let _ = tcsetattr(io::stdin(), SetArg::TCSANOW, termios);
        }
    }
}

pub struct PtyChannels {
    terminal_in: RawFd,
    terminal_out: RawFd,
    shell: RawFd,
    child_pid: u32,
    pending: Vec<u8>,
}

impl PtyChannels {
    fn drain_pending(&mut self) -> io::Result<()> {
        match write_available(self.shell, &self.pending) {
            Ok(written) => {
                self.pending.drain(..written);
                Ok(())
            }
            // The shell is gone; the next read reports it.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                self.pending.clear();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn forward_pending_signals(&self) {
        if SIGINT_RECEIVED.swap(false, Ordering::SeqCst) {
            forward_signal(self.child_pid, Signal::SIGINT);
        }
        if SIGTERM_RECEIVED.swap(false, Ordering::SeqCst) {
            forward_signal(self.child_pid, Signal::SIGTERM);
        }
    }
}

impl Channels for PtyChannels {
    fn wait(&mut self, shell: bool, timeout: Option<Duration>) -> io::Result<Readiness> {
        self.forward_pending_signals();

        // Stop reading keys while the shell is not taking them, but keep
        // reading its output so it cannot block on a full pty.
        let backlogged = shell && self.pending.len() >= MAX_PENDING_INPUT;
        let mut poll_fds = [
            libc::pollfd {
                fd: self.terminal_in,
                events: if backlogged { 0 } else { libc::POLLIN },
                revents: 0,
            },
            libc::pollfd {
                fd: self.shell,
                events: if self.pending.is_empty() {
                    libc::POLLIN
                } else {
                    libc::POLLIN | libc::POLLOUT
                },
                revents: 0,
            },
        ];
        let count: libc::nfds_t = if shell { 2 } else { 1 };
        let timeout_ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as i32);

        let poll_ret = unsafe { libc::poll(poll_fds.as_mut_ptr(), count, timeout_ms) };
        if poll_ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(err);
        }

        if shell && poll_fds[1].revents & libc::POLLOUT != 0 {
            self.drain_pending()?;
        }

        // Hang-ups are reported as readable; the read then sees end of file.
        let readable = |fd: &libc::pollfd| {
            fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
        };
        Ok(Readiness {
            terminal: readable(&poll_fds[0]),
            shell: shell && readable(&poll_fds[1]),
        })
    }

    fn read_terminal(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        libc_read(self.terminal_in, buf)
    }

    fn read_shell(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match libc_read(self.shell, buf) {
            // Linux reports a closed slave as EIO on the master.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(0),
            other => other,
        }
    }

    fn write_terminal(&mut self, data: &[u8]) -> io::Result<()> {
        write_all_raw(self.terminal_out, data)
    }

    fn write_shell(&mut self, data: &[u8]) -> io::Result<()> {
        self.pending.extend_from_slice(data);
        self.drain_pending()
    }
}

pub fn terminal_geometry() -> Result<Geometry> {
    geometry_of(io::stdout().as_raw_fd())
}

fn geometry_of(fd: RawFd) -> Result<Geometry> {
    let mut ws: Winsize = unsafe { std::mem::zeroed() };
    if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) } == -1 {
        return Err(io::Error::last_os_error()).context("cannot read the terminal size");
    }
    Geometry::new(ws.ws_row as usize, ws.ws_col as usize).context("terminal reports no size")
}

fn forward_signal(pid: u32, signal: Signal) {
    debug!(?signal, pid, "forwarding signal");
    let ret = unsafe { libc::kill(pid as i32, signal as i32) };
    if ret == -1 {
        warn!(?signal, pid, error = %io::Error::last_os_error(), "failed to forward signal");
    }
}

fn exit_code_from_status(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        128 + signal
    } else {
        1
    }
}

fn setup_raw_mode() -> Result<Option<Termios>> {
    let stdin = io::stdin();
    let is_tty = unsafe { libc::isatty(stdin.as_raw_fd()) == 1 };
    if !is_tty {
        return Ok(None);
    }

    let original = tcgetattr(&stdin).context("tcgetattr failed")?;
    let mut raw = original.clone();
    cfmakeraw(&mut raw);
    tcsetattr(&stdin, SetArg::TCSANOW, &raw).context("tcsetattr failed")?;
    Ok(Some(original))
}

fn setup_signal_handler(signal: Signal, handler: extern "C" fn(libc::c_int)) -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(signal, &action) }.context(format!("sigaction {:?} failed", signal))?;
    Ok(())
}

fn setup_signal_handlers() -> Result<()> {
    setup_signal_handler(Signal::SIGINT, handle_sigint)?;
    setup_signal_handler(Signal::SIGTERM, handle_sigterm)?;
    Ok(())
}

fn set_nonblocking<Fd: AsFd>(fd: &Fd) -> Result<()> {
    let flags = fcntl(fd.as_fd(), FcntlArg::F_GETFL).context("fcntl F_GETFL failed")?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd.as_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))
        .context("fcntl F_SETFL failed")?;
    Ok(())
}

fn write_all_raw(fd: RawFd, data: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < data.len() {
        match libc_write(fd, &data[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => wait_writable(fd)?,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write what `fd` accepts without blocking. Returns the number of bytes
/// written.
fn write_available(fd: RawFd, data: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match libc_write(fd, &data[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

fn wait_writable(fd: RawFd) -> io::Result<()> {
    let mut poll_fd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    if unsafe { libc::poll(&mut poll_fd, 1, -1) } < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(())
}

fn libc_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

fn libc_write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let ret = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::BorrowedFd;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_exit_code_from_status() {
        assert_eq!(exit_code_from_status(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code_from_status(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code_from_status(ExitStatus::from_raw(9)), 137);
    }

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn close(fds: &[RawFd]) {
        for &fd in fds {
            unsafe { libc::close(fd) };
        }
    }

    fn fill(fd: RawFd) {
        set_nonblocking(&unsafe { BorrowedFd::borrow_raw(fd) }).unwrap();
        let chunk = [b'x'; 4096];
        while write_available(fd, &chunk).unwrap() > 0 {}
    }

    fn drain(fd: RawFd) -> Vec<u8> {
        set_nonblocking(&unsafe { BorrowedFd::borrow_raw(fd) }).unwrap();
        let mut all = Vec::new();
        let mut buf = [0u8; 4096];
        while let Ok(n) = libc_read(fd, &mut buf) {
            if n == 0 {
                break;
            }
            all.extend_from_slice(&buf[..n]);
        }
        all
    }

    fn channels(terminal_in: RawFd, shell: RawFd) -> PtyChannels {
        PtyChannels {
            terminal_in,
            terminal_out: terminal_in,
            shell,
            child_pid: std::process::id(),
            pending: Vec::new(),
        }
    }

    #[test]
    fn test_full_shell_queues_input() {
        let (keys_r, keys_w) = pipe();
        let (shell_r, shell_w) = pipe();
        fill(shell_w);
        let mut channels = channels(keys_r, shell_w);

        let started = std::time::Instant::now();
        channels.write_shell(b"paste").unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(channels.pending, b"paste");

        let backlog = drain(shell_r);
        assert!(!backlog.is_empty());
        channels
            .wait(true, Some(Duration::from_millis(100)))
            .unwrap();
        assert!(channels.pending.is_empty());
        assert_eq!(drain(shell_r), b"paste");

        close(&[keys_r, keys_w, shell_r, shell_w]);
    }

    #[test]
    fn test_backlogged_input_pauses_terminal() {
        let (keys_r, keys_w) = pipe();
        let (shell_r, shell_w) = pipe();
        fill(shell_w);
        write_all_raw(keys_w, b"typed").unwrap();
        let mut channels = channels(keys_r, shell_w);
        channels.pending = vec![b'y'; MAX_PENDING_INPUT];

        let ready = channels
            .wait(true, Some(Duration::from_millis(50)))
            .unwrap();
        assert!(!ready.terminal);

        // While resolving a position the terminal is always read.
        let ready = channels
            .wait(false, Some(Duration::from_millis(50)))
            .unwrap();
        assert!(ready.terminal);

        close(&[keys_r, keys_w, shell_r, shell_w]);
    }

    #[test]
    fn test_write_waits_for_room_instead_of_failing() {
        let (read_fd, write_fd) = pipe();
        fill(write_fd);
        let reader = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let mut total = Vec::new();
            let mut buf = [0u8; 4096];
            while !total.ends_with(b"paste") {
                match libc_read(read_fd, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => total.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => panic!("{}", e),
                }
            }
            total
        });
        write_all_raw(write_fd, b"paste").unwrap();
        let total = reader.join().unwrap();
        assert!(total.ends_with(b"paste"));
        close(&[read_fd, write_fd]);
    }

    #[test]
    fn test_geometry_needs_a_terminal() {
        let (read_fd, write_fd) = pipe();
        assert!(geometry_of(write_fd).is_err());
        close(&[read_fd, write_fd]);
    }

    #[test]
    fn test_raw_helpers_over_a_pipe() {
        let (read_fd, write_fd) = pipe();
        write_all_raw(write_fd, b"hello").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(libc_read(read_fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        close(&[read_fd, write_fd]);
    }
}
