//! Status and classification enums.
//!
//! Integer-backed statuses map to SMALLINT columns; their discriminants are
//! the values stored in the database and reported in API payloads.
//! String-backed enums map to TEXT columns and serialize as their wire name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID. Unknown IDs yield `None`.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Human-readable label used in notifications and logs.
            pub fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i16(self.id())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let id = StatusId::deserialize(deserializer)?;
                Self::from_id(id).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown {} id: {id}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

macro_rules! define_str_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $val)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Wire / column value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $val, )+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $val => Ok(Self::$variant), )+
                    other => Err(format!(
                        "unknown {} value: {other}",
                        stringify!($name)
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Integer-backed statuses
// ---------------------------------------------------------------------------

define_status_enum! {
    /// Connection status of a managed platform.
    PlatformStatus {
        Disconnected = 0 => "Disconnected",
        Connected = 1 => "Connected",
        Error = 2 => "Error",
        Maintenance = 3 => "Maintenance",
    }
}

define_status_enum! {
    /// Operating status of a compute host.
    HostStatus {
        Offline = 0 => "Offline",
        Online = 1 => "Online",
        Maintenance = 2 => "Maintenance",
        Unknown = 5 => "Unknown",
    }
}

define_status_enum! {
    /// Run status of a virtual machine, derived from its power state.
    VmStatus {
        Unknown = 0 => "Unknown",
        Running = 1 => "Running",
        Stopped = 2 => "Stopped",
        Suspended = 3 => "Suspended",
    }
}

define_status_enum! {
    /// Lifecycle status shared by operation tasks and operation logs.
    OperationStatus {
        Pending = 0 => "Pending",
        Running = 1 => "Running",
        Success = 2 => "Success",
        Failed = 3 => "Failed",
        Cancelled = 4 => "Cancelled",
    }
}

impl OperationStatus {
    /// Success, failed and cancelled are terminal: no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// String-backed enums
// ---------------------------------------------------------------------------

define_str_enum! {
    /// Kind of virtualization endpoint.
    PlatformType {
        /// Controller mode: one endpoint manages many hosts.
        Vcenter => "vcenter",
        /// Single-host mode.
        Esxi => "esxi",
        Kvm => "kvm",
        Proxmox => "proxmox",
    }
}

define_str_enum! {
    /// Kind of asynchronous operation tracked by an OperationTask.
    TaskType {
        SyncPlatform => "sync_platform",
        SyncHosts => "sync_hosts",
        SyncVms => "sync_vms",
        SyncDatastores => "sync_datastores",
        SyncTemplates => "sync_templates",
        CollectMetrics => "collect_metrics",
        BatchOperation => "batch_operation",
    }
}

define_str_enum! {
    /// Kind of operator-triggered action recorded in an OperationLog.
    OperationType {
        VmCreate => "vm_create",
        VmDelete => "vm_delete",
        VmStart => "vm_start",
        VmStop => "vm_stop",
        VmRestart => "vm_restart",
        VmSuspend => "vm_suspend",
        VmSnapshot => "vm_snapshot",
        VmClone => "vm_clone",
        SyncData => "sync_data",
        Other => "other",
    }
}

define_str_enum! {
    /// Guest operating system family.
    OsType {
        Windows => "windows",
        Centos => "centos",
        Ubuntu => "ubuntu",
        Debian => "debian",
        Redhat => "redhat",
        Linux => "linux",
        Other => "other",
    }
}

define_str_enum! {
    /// Datastore filesystem type.
    DatastoreType {
        Vmfs => "vmfs",
        Nfs => "nfs",
        Nfs41 => "nfs41",
        Vsan => "vsan",
        Vvol => "vvol",
    }
}

define_str_enum! {
    /// Datastore access mode.
    AccessMode {
        ReadWrite => "readWrite",
        ReadOnly => "readOnly",
    }
}

define_str_enum! {
    /// Virtual disk provisioning.
    DiskProvisioning {
        Thin => "thin",
        Thick => "thick",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
