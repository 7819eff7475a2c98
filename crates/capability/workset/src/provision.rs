//! 设备开通：在一个事务中创建设备及其默认变量表。

use crate::error::SessionError;
use dms_storage::{EntityStore, StorageError, UnitOfWork, begin, finish};
use domain::{Device, VariableTable};
use tracing::info;

async fn create_in(
    uow: &mut dyn UnitOfWork,
    device: Device,
    mut table: VariableTable,
) -> Result<(Device, VariableTable), StorageError> {
    let device = uow.devices().add(device).await?;
    table.id = 0;
    table.device_id = device.id;
    table.protocol = device.protocol;
    let table = uow.variable_tables().add(table).await?;
    Ok((device, table))
}

/// 创建设备与默认变量表（变量表协议跟随设备），任一失败均不落库。
pub async fn create_device_with_table(
    store: &dyn EntityStore,
    device: Device,
    table: VariableTable,
) -> Result<(Device, VariableTable), SessionError> {
    let mut uow = begin(store).await?;
    let result = create_in(uow.as_mut(), device, table).await;
    let (device, table) = finish(uow, result).await?;
    info!(
        target: "dms.workset",
        device_id = device.id,
        table_id = table.id,
        protocol = device.protocol.as_str(),
        "device_provisioned"
    );
    Ok((device, table))
}
