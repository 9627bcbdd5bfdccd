//! Hardened container specification
//!
//! The security settings here are applied to every container and are not
//! reachable from tool input. Only the resource ceilings come from operator
//! configuration.

use std::collections::BTreeMap;

pub const TMP_MOUNT_PATH: &str = "/tmp";
pub const NOBODY_USER: &str = "65534:65534";

const MIB: i64 = 1024 * 1024;

/// Operator-tunable ceilings enforced by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub cpu_nanos: i64,
    pub pids_limit: i64,
    pub tmpfs_size_bytes: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 256 * MIB,
            cpu_nanos: 1_000_000_000,
            pids_limit: 64,
            tmpfs_size_bytes: 64 * MIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub memory_limit_bytes: i64,
    /// Always equal to `memory_limit_bytes`: no swap beyond the memory ceiling.
    pub memory_swap_bytes: i64,
    pub cpu_nanos: i64,
    pub pids_limit: i64,
    pub network_disabled: bool,
    pub network_mode: String,
    pub readonly_rootfs: bool,
    pub tmpfs_mounts: BTreeMap<String, String>,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
    pub privileged: bool,
    pub user: String,
    pub working_dir: String,
}

impl SandboxSpec {
    pub fn hardened(
        name: String,
        image: &str,
        command: Vec<String>,
        limits: &ResourceLimits,
    ) -> Self {
        let mut tmpfs_mounts = BTreeMap::new();
        tmpfs_mounts.insert(
            TMP_MOUNT_PATH.to_string(),
            format!("rw,noexec,nosuid,nodev,size={}", limits.tmpfs_size_bytes),
        );

        Self {
            name,
            image: image.to_string(),
            command,
            memory_limit_bytes: limits.memory_bytes,
            memory_swap_bytes: limits.memory_bytes,
            cpu_nanos: limits.cpu_nanos,
            pids_limit: limits.pids_limit,
            network_disabled: true,
            network_mode: "none".to_string(),
            readonly_rootfs: true,
            tmpfs_mounts,
            cap_drop: vec!["ALL".to_string()],
            security_opt: vec!["no-new-privileges:true".to_string()],
            privileged: false,
            user: NOBODY_USER.to_string(),
            working_dir: TMP_MOUNT_PATH.to_string(),
        }
    }
}
