//! Backup shipping between clusters, receiving side.

pub mod l2l_dst;
pub mod restore;
pub mod shipping_mgr;
pub mod short_id;
pub mod types;

pub use l2l_dst::BackupL2LDstHandler;
pub use restore::{KEY_SHIPPING_REMOTE, KEY_SOURCE_BACKUP, RestoreInput, restore_backup};
pub use shipping_mgr::{
    BackupShippingMgr, BackupShippingService, L2lShippingService, S3ShippingService,
    TrackedSession,
};
pub use short_id::{RandomShortIds, SHORT_ID_NAMESPACE, ShortIdSource};
pub use types::{
    BackupMetadata, BackupShippingData, BackupShippingRequest, BackupShippingResponse,
    BackupVolumeMetadata,
};

/// Resource definition namespace listing the remotes currently shipping into
/// it, keyed by remote name with the target snapshot name as value.
pub const NAMESPC_SHIPPING_REMOTES: &str = "Backup/Shipping/Remotes";

/// Namespace of the preferred network interface for receiving shipments.
pub const NAMESPC_BACKUP_SHIPPING: &str = "BackupShipping";
pub const KEY_PREF_NIC: &str = "PrefNic";
