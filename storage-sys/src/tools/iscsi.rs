// SPDX-License-Identifier: GPL-3.0-only

//! iSCSI initiator operations through `iscsiadm`

use std::fs;
use std::path::Path;

use storage_contracts::IscsiErrorKind;
use storage_types::{IscsiNode, IscsiSessionInfo};
use tracing::info;

use super::read_attribute;
use crate::command::run_capture;
use crate::{Result, SysError};

const SYS_CLASS: &str = "/sys/class";

/// Map an `iscsiadm` exit status onto the iSCSI error family
pub fn error_kind_for_exit_code(code: i32) -> Option<IscsiErrorKind> {
    match code {
        4 | 8 | 12 | 14 => Some(IscsiErrorKind::TransportFailed),
        5 => Some(IscsiErrorKind::LoginFailed),
        6 => Some(IscsiErrorKind::Idmb),
        10 => Some(IscsiErrorKind::LogoutFailed),
        18 => Some(IscsiErrorKind::CommunicationFailed),
        19 => Some(IscsiErrorKind::LoginFatal),
        20 => Some(IscsiErrorKind::NotConnected),
        21 => Some(IscsiErrorKind::NoObjectsFound),
        23 => Some(IscsiErrorKind::HostNotFound),
        24 => Some(IscsiErrorKind::LoginAuthFailed),
        30 => Some(IscsiErrorKind::UnknownDiscoveryType),
        _ => None,
    }
}

fn iscsiadm(args: &[&str]) -> Result<String> {
    if !cfg!(feature = "iscsi-tools") {
        return Err(SysError::Disabled("iscsi"));
    }
    run_capture("iscsiadm", args).map_err(|err| match err {
        SysError::CommandFailed {
            code: Some(code),
            stderr,
            ..
        } => match error_kind_for_exit_code(code) {
            Some(kind) => SysError::Iscsi {
                kind,
                message: stderr,
            },
            None => SysError::OperationFailed(format!("iscsiadm exited with {code}: {stderr}")),
        },
        other => other,
    })
}

/// `InitiatorName=` value of the initiator name file
pub fn initiator_name(file: &Path) -> Result<String> {
    let contents = fs::read_to_string(file)?;
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("InitiatorName="))
        .map(|name| name.trim().to_string())
        .ok_or_else(|| SysError::parse(file.display().to_string(), "no InitiatorName entry"))
}

/// Parse `address:port,tpgt target` discovery lines
fn parse_discovery(output: &str) -> Vec<IscsiNode> {
    output
        .lines()
        .filter_map(|line| {
            let (portal, name) = line.trim().split_once(' ')?;
            let (address_port, tpgt) = portal.split_once(',')?;
            let (address, port) = address_port.rsplit_once(':')?;
            Some(IscsiNode {
                name: name.trim().to_string(),
                tpgt: tpgt.parse().ok()?,
                address: address.trim_matches(['[', ']']).to_string(),
                port: port.parse().ok()?,
                iface: "default".to_string(),
            })
        })
        .collect()
}

pub fn discover_send_targets(address: &str, port: u16) -> Result<Vec<IscsiNode>> {
    let portal = format!("{address}:{port}");
    let output = iscsiadm(&["-m", "discovery", "-t", "sendtargets", "-p", &portal])?;
    Ok(parse_discovery(&output))
}

fn node_args<'a>(node: &'a IscsiNode, portal: &'a str, operation: &'a str) -> Vec<&'a str> {
    let mut args = vec!["-m", "node", "-T", node.name.as_str(), "-p", portal];
    if !node.iface.is_empty() {
        args.extend(["-I", node.iface.as_str()]);
    }
    args.push(operation);
    args
}

pub fn login(node: &IscsiNode) -> Result<()> {
    let portal = format!("{}:{}", node.address, node.port);
    iscsiadm(&node_args(node, &portal, "--login"))?;
    info!("Logged in to {} at {portal}", node.name);
    Ok(())
}

pub fn logout(node: &IscsiNode) -> Result<()> {
    let portal = format!("{}:{}", node.address, node.port);
    iscsiadm(&node_args(node, &portal, "--logout"))?;
    info!("Logged out of {} at {portal}", node.name);
    Ok(())
}

pub fn session_info(session_id: &str) -> Result<IscsiSessionInfo> {
    read_session(Path::new(SYS_CLASS), session_id)
}

pub(crate) fn read_session(sys_class: &Path, session_id: &str) -> Result<IscsiSessionInfo> {
    let session = sys_class.join("iscsi_session").join(session_id);
    let number = session_id.trim_start_matches("session");
    let connection = sys_class
        .join("iscsi_connection")
        .join(format!("connection{number}:0"));
    let int = |path: &Path| -> i32 {
        read_attribute(path)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    };

    Ok(IscsiSessionInfo {
        session_id: session_id.to_string(),
        target_name: read_attribute(&session.join("targetname"))?,
        tpgt: int(&session.join("tpgt")),
        address: read_attribute(&connection.join("address")).unwrap_or_default(),
        port: int(&connection.join("port")),
        persistent_address: read_attribute(&connection.join("persistent_address"))
            .unwrap_or_default(),
        persistent_port: int(&connection.join("persistent_port")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_to_wire_errors() {
        assert_eq!(error_kind_for_exit_code(24), Some(IscsiErrorKind::LoginAuthFailed));
        assert_eq!(error_kind_for_exit_code(21), Some(IscsiErrorKind::NoObjectsFound));
        assert_eq!(error_kind_for_exit_code(6), Some(IscsiErrorKind::Idmb));
        assert_eq!(error_kind_for_exit_code(1), None);
    }

    #[test]
    fn parses_discovery_output() {
        let nodes = parse_discovery(
            "192.168.1.10:3260,1 iqn.2024-01.org.example:disk1\n[fe80::1]:3260,2 iqn.2024-01.org.example:disk2\n",
        );

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].address, "192.168.1.10");
        assert_eq!(nodes[0].port, 3260);
        assert_eq!(nodes[0].tpgt, 1);
        assert_eq!(nodes[1].address, "fe80::1");
        assert_eq!(nodes[1].name, "iqn.2024-01.org.example:disk2");
    }

    #[test]
    fn reads_initiator_name_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("initiatorname.iscsi");
        fs::write(&file, "## generated\nInitiatorName=iqn.1994-05.com.redhat:abc\n").expect("write");
        assert_eq!(
            initiator_name(&file).expect("name"),
            "iqn.1994-05.com.redhat:abc"
        );
    }

    #[test]
    fn reads_session_from_sysfs() {
        let root = tempfile::tempdir().expect("tempdir");
        let session = root.path().join("iscsi_session/session3");
        let connection = root.path().join("iscsi_connection/connection3:0");
        fs::create_dir_all(&session).expect("mkdir");
        fs::create_dir_all(&connection).expect("mkdir");
        fs::write(session.join("targetname"), "iqn.2024-01.org.example:disk1\n").expect("write");
        fs::write(session.join("tpgt"), "1\n").expect("write");
        fs::write(connection.join("address"), "192.168.1.10\n").expect("write");
        fs::write(connection.join("port"), "3260\n").expect("write");

        let info = read_session(root.path(), "session3").expect("session");

        assert_eq!(info.target_name, "iqn.2024-01.org.example:disk1");
        assert_eq!(info.port, 3260);
        assert_eq!(info.persistent_port, 0);
    }
}
