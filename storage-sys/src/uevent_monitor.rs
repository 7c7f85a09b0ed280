// SPDX-License-Identifier: GPL-3.0-only

//! udev netlink monitor
//!
//! udevd re-broadcasts every processed kernel event on netlink multicast
//! group 2, framed with a `libudev` header. Listening there instead of on the
//! raw kernel group means the udev database is already up to date when the
//! event arrives.

use std::collections::BTreeMap;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::socket::{
    AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType, bind, recv, socket,
};
use tracing::{trace, warn};

use crate::Result;

const UDEV_MONITOR_GROUP: u32 = 2;
const UDEV_MONITOR_PREFIX: &[u8] = b"libudev\0";
const UDEV_MONITOR_MAGIC: u32 = 0xfeed_cafe;
const UDEV_HEADER_LEN: usize = 40;
const RECEIVE_BUFFER_LEN: usize = 16 * 1024;

pub struct UeventMonitor {
    socket: OwnedFd,
}

impl UeventMonitor {
    pub fn open() -> Result<Self> {
        let socket = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkKObjectUEvent,
        )
        .map_err(std::io::Error::from)?;
        bind(
            socket.as_raw_fd(),
            &NetlinkAddr::new(0, UDEV_MONITOR_GROUP),
        )
        .map_err(std::io::Error::from)?;
        Ok(Self { socket })
    }

    /// Block until the next message arrives; `None` for frames that are not
    /// udev messages
    pub fn receive(&self) -> Result<Option<BTreeMap<String, String>>> {
        let mut buffer = vec![0u8; RECEIVE_BUFFER_LEN];
        let len = match recv(self.socket.as_raw_fd(), &mut buffer, MsgFlags::empty()) {
            Ok(len) => len,
            Err(Errno::EINTR) => return Ok(None),
            Err(Errno::ENOBUFS) => {
                warn!("Device monitor receive buffer overflowed, events were lost");
                return Ok(None);
            }
            Err(e) => return Err(std::io::Error::from(e).into()),
        };
        let message = parse_udev_message(&buffer[..len]);
        if message.is_none() {
            trace!("Ignoring {len}-byte non-udev netlink frame");
        }
        Ok(message)
    }
}

/// Decode one `libudev` framed message into its property map
pub fn parse_udev_message(frame: &[u8]) -> Option<BTreeMap<String, String>> {
    if frame.len() < UDEV_HEADER_LEN || !frame.starts_with(UDEV_MONITOR_PREFIX) {
        return None;
    }
    let field = |offset: usize| -> Option<[u8; 4]> { frame.get(offset..offset + 4)?.try_into().ok() };
    if u32::from_be_bytes(field(8)?) != UDEV_MONITOR_MAGIC {
        return None;
    }
    let properties_off = u32::from_ne_bytes(field(16)?) as usize;
    let properties_len = u32::from_ne_bytes(field(20)?) as usize;
    let payload = frame.get(properties_off..properties_off.checked_add(properties_len)?)?;

    let properties: BTreeMap<String, String> = payload
        .split(|byte| *byte == 0)
        .filter_map(|entry| std::str::from_utf8(entry).ok())
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    properties.contains_key("ACTION").then_some(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(properties: &[&str]) -> Vec<u8> {
        let mut payload = Vec::new();
        for property in properties {
            payload.extend_from_slice(property.as_bytes());
            payload.push(0);
        }
        let mut frame = Vec::new();
        frame.extend_from_slice(UDEV_MONITOR_PREFIX);
        frame.extend_from_slice(&UDEV_MONITOR_MAGIC.to_be_bytes());
        frame.extend_from_slice(&(UDEV_HEADER_LEN as u32).to_ne_bytes());
        frame.extend_from_slice(&(UDEV_HEADER_LEN as u32).to_ne_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
        frame.resize(UDEV_HEADER_LEN, 0);
        frame.extend_from_slice(&payload);
        frame
    }

    #[test]
    fn decodes_udev_frames() {
        let message = parse_udev_message(&frame(&[
            "ACTION=change",
            "DEVPATH=/devices/virtual/block/zram0",
            "SUBSYSTEM=block",
            "ID_FS_TYPE=swap",
        ]))
        .expect("udev message");

        assert_eq!(message.get("ACTION").map(String::as_str), Some("change"));
        assert_eq!(message.get("ID_FS_TYPE").map(String::as_str), Some("swap"));
    }

    #[test]
    fn rejects_kernel_frames_and_bad_magic() {
        assert_eq!(
            parse_udev_message(b"add@/devices/virtual/block/loop0\0ACTION=add\0"),
            None
        );

        let mut corrupted = frame(&["ACTION=add"]);
        corrupted[8] ^= 0xff;
        assert_eq!(parse_udev_message(&corrupted), None);
    }

    #[test]
    fn rejects_truncated_payloads() {
        let mut truncated = frame(&["ACTION=add", "DEVPATH=/devices/virtual/block/loop0"]);
        truncated.truncate(UDEV_HEADER_LEN + 4);
        assert_eq!(parse_udev_message(&truncated), None);
    }

    #[test]
    fn monitor_binds_to_udev_group() {
        let monitor = match UeventMonitor::open() {
            Ok(monitor) => monitor,
            Err(e) => {
                eprintln!("SKIP: netlink unavailable: {e}");
                return;
            }
        };
        let bound: NetlinkAddr =
            nix::sys::socket::getsockname(monitor.socket.as_raw_fd()).expect("socket address");
        assert_eq!(bound.groups(), UDEV_MONITOR_GROUP);
    }
}
