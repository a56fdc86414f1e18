//! Software compute device and the building blocks shared by the scan and
//! sort engines: buffers, command lists with barrier checking, large-dispatch
//! tiling, the partition model, decoupled-lookback tables and tuning presets.

pub mod buffer;
pub mod device;
pub mod dispatch;
pub mod hardware;
pub mod lookback;
pub mod partition;
pub mod timing;
pub mod tuning;
pub mod types;

pub use buffer::{BufferUsage, DeviceBuffer, Resource, ResourceId};
pub use device::{
    Access, Binding, CommandList, Device, DeviceConfig, DeviceError, DeviceLimits, ExecutionMode,
    GroupContext, Kernel,
};
pub use dispatch::{
    logical_group_index, plan_dispatch, DispatchTile, GridSize, TileMode, MAX_DISPATCH_DIMENSION,
};
pub use hardware::DeviceInfo;
pub use lookback::{claim_partition, LookbackTable, SlotState, SlotStatus};
pub use partition::PartitionLayout;
pub use timing::{keys_per_second, BenchTimer};
pub use tuning::{
    KernelFamily, KernelVariant, Tuner, TuningError, TuningParameters, SCAN_PARTITION_SIZE,
    SORT_PARTITION_SIZES,
};
pub use types::DispatchConstants;
