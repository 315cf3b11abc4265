//! Single-file transfers over the exec channel.
//!
//! Upload speaks the receiving side of the scp protocol: a one-line
//! control header `<mode> <size> <name>\n`, the file content verbatim,
//! then one NUL byte as the end-of-transfer marker. Download streams
//! `cat` output into a local file.

use std::io;
use std::path::Path;

use log::debug;
use russh::ChannelMsg;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransportError};
use crate::session::check_exit;
use crate::transport::SshTransport;

/// Streams files between the local filesystem and a remote host.
pub struct FileTransferPump<'t> {
    transport: &'t SshTransport,
}

/// Format the scp control header for one file.
fn control_header(size: u64, name: &str) -> String {
    format!("C0664 {size} {name}\n")
}

/// Write header, content, and the NUL terminator into the receiving
/// process's input, then signal EOF. Returns the total bytes written:
/// header length + file size + 1.
async fn pump_into<W>(mut stdin: W, mut file: File, size: u64, name: &str) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let header = control_header(size, name);
    stdin
        .write_all(header.as_bytes())
        .await
        .map_err(TransportError::Io)?;

    let copied = tokio::io::copy(&mut file, &mut stdin)
        .await
        .map_err(TransportError::Io)?;

    stdin.write_all(b"\x00").await.map_err(TransportError::Io)?;
    stdin.flush().await.map_err(TransportError::Io)?;
    stdin.shutdown().await.map_err(TransportError::Io)?;

    Ok(header.len() as u64 + copied + 1)
}

impl<'t> FileTransferPump<'t> {
    /// Create a pump borrowing the client's transport.
    pub fn new(transport: &'t SshTransport) -> Self {
        Self { transport }
    }

    /// Upload a local file to `remote_path`.
    ///
    /// One background task pumps header, content, and terminator into
    /// the receiving `scp -t` process while this task waits for the
    /// remote command to finish. The pump task is joined before the
    /// session is torn down, so completion implies the terminator was
    /// pushed.
    pub async fn upload(&self, local_path: &Path, remote_path: &Path) -> Result<()> {
        let remote_dir = match remote_path.parent() {
            Some(dir) if dir.as_os_str().is_empty() => "./".to_string(),
            Some(dir) => format!("{}/", dir.display()),
            None => "./".to_string(),
        };
        let remote_name = remote_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let file = File::open(local_path).await.map_err(TransportError::Io)?;
        let size = file.metadata().await.map_err(TransportError::Io)?.len();

        let command = format!("/usr/bin/scp -t {remote_dir}");
        let channel = self.transport.open_session().await?;
        channel
            .exec(true, command.as_str())
            .await
            .map_err(TransportError::Ssh)?;

        let (mut read_half, write_half) = channel.split();

        let pump = tokio::spawn(async move {
            pump_into(write_half.make_writer(), file, size, &remote_name).await
        });

        // Drain the read side while the pump writes: scp's single-byte
        // acknowledgements and the exit status arrive here.
        let mut exit_status = None;
        while let Some(msg) = read_half.wait().await {
            match msg {
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        // Join before teardown: the transfer is complete only once the
        // pump confirms it pushed the terminator.
        let written = pump
            .await
            .map_err(|e| TransportError::Io(io::Error::other(e)))??;
        debug!("uploaded {} bytes (header + content + terminator)", written);

        check_exit(&command, exit_status, true)
    }

    /// Download `remote_path` into a local file, creating it if absent.
    pub async fn download(&self, remote_path: &Path, local_path: &Path) -> Result<()> {
        let command = format!("cat {}", remote_path.display());

        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(0o644);
        let mut file = options.open(local_path).await.map_err(TransportError::Io)?;

        let mut channel = self.transport.open_session().await?;
        channel
            .exec(true, command.as_str())
            .await
            .map_err(TransportError::Ssh)?;

        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    file.write_all(&data).await.map_err(TransportError::Io)?;
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        file.flush().await.map_err(TransportError::Io)?;

        check_exit(&command, exit_status, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_control_header_format() {
        assert_eq!(control_header(1234, "notes.txt"), "C0664 1234 notes.txt\n");
        assert_eq!(control_header(0, "empty"), "C0664 0 empty\n");
    }

    #[tokio::test]
    async fn test_pump_writes_header_content_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let file = File::open(&path).await.unwrap();

        let (stdin, mut remote) = tokio::io::duplex(4096);
        let pump = tokio::spawn(async move { pump_into(stdin, file, 11, "payload").await });

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        let written = pump.await.unwrap().unwrap();

        let expected = b"C0664 11 payload\nhello world\x00";
        assert_eq!(received, expected);
        assert_eq!(written, expected.len() as u64);
    }

    #[tokio::test]
    async fn test_pump_total_bytes_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        let content = vec![0xabu8; 4096];
        tokio::fs::write(&path, &content).await.unwrap();
        let file = File::open(&path).await.unwrap();

        let (stdin, mut remote) = tokio::io::duplex(64 * 1024);
        let pump =
            tokio::spawn(async move { pump_into(stdin, file, 4096, "payload").await });

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        let written = pump.await.unwrap().unwrap();

        let header = control_header(4096, "payload");
        assert_eq!(written, header.len() as u64 + 4096 + 1);
        assert_eq!(received.len() as u64, written);
        assert_eq!(received.last(), Some(&0u8));
    }
}
