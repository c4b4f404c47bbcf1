use super::{FdPool, owned_fd};
use crate::provider::FdProvider;
use log::debug;
use rand_core::RngCore;
use std::io;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::os::fd::RawFd;
use std::os::unix::net::{UnixDatagram, UnixListener, UnixStream};
use tempfile::TempDir;

const NR_PIPES: usize = 4;

/// Local sockets of several families and types.
///
/// Each kind is attempted independently; the provider opens if any of them
/// succeeded. The directory holding the bound unix socket lives as long as
/// the provider.
#[derive(Debug, Default)]
pub struct SocketsProvider {
    pool: FdPool,
    socket_dir: Option<TempDir>,
}

impl SocketsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_all_kinds(&mut self) -> Vec<io::Error> {
        let mut errors = Vec::new();

        match UnixStream::pair() {
            Ok((a, b)) => {
                self.pool.push(a);
                self.pool.push(b);
            }
            Err(e) => errors.push(e),
        }
        match UnixDatagram::pair() {
            Ok((a, b)) => {
                self.pool.push(a);
                self.pool.push(b);
            }
            Err(e) => errors.push(e),
        }
        match UnixDatagram::unbound() {
            Ok(sock) => self.pool.push(sock),
            Err(e) => errors.push(e),
        }
        match UdpSocket::bind("127.0.0.1:0") {
            Ok(sock) => self.pool.push(sock),
            Err(e) => errors.push(e),
        }
        match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => {
                if let Ok(client) = listener.local_addr().and_then(TcpStream::connect) {
                    self.pool.push(client);
                }
                self.pool.push(listener);
            }
            Err(e) => errors.push(e),
        }
        match self.bind_unix_listener() {
            Ok(listener) => self.pool.push(listener),
            Err(e) => errors.push(e),
        }

        errors
    }

    fn bind_unix_listener(&mut self) -> io::Result<UnixListener> {
        let dir = tempfile::Builder::new().prefix("fdpool-sock-").tempdir()?;
        let listener = UnixListener::bind(dir.path().join("sock"))?;
        self.socket_dir = Some(dir);
        Ok(listener)
    }
}

impl FdProvider for SocketsProvider {
    fn name(&self) -> &'static str {
        "sockets"
    }

    fn open(&mut self) -> bool {
        for e in self.open_all_kinds() {
            debug!("sockets: {e}");
        }
        !self.pool.is_empty()
    }

    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd {
        self.pool.pick(rng)
    }
}

/// Both ends of a handful of pipes, some blocking and some not.
#[derive(Debug, Default)]
pub struct PipesProvider {
    pool: FdPool,
}

impl PipesProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_pipe(&mut self, flags: libc::c_int) -> io::Result<()> {
        let mut ends = [0 as libc::c_int; 2];
        if unsafe { libc::pipe2(ends.as_mut_ptr(), flags) } < 0 {
            return Err(io::Error::last_os_error());
        }
        self.pool.push(owned_fd(ends[0])?);
        self.pool.push(owned_fd(ends[1])?);
        Ok(())
    }
}

impl FdProvider for PipesProvider {
    fn name(&self) -> &'static str {
        "pipes"
    }

    fn open(&mut self) -> bool {
        for i in 0..NR_PIPES {
            let flags = if i % 2 == 0 { 0 } else { libc::O_NONBLOCK };
            if let Err(e) = self.open_pipe(flags) {
                debug!("pipes: {e}");
                break;
            }
        }
        !self.pool.is_empty()
    }

    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd {
        self.pool.pick(rng)
    }
}
