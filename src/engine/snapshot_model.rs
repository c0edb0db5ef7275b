// ==========================================
// 保护定值同步系统 - 离线模型快照
// ==========================================
// 用途: 无在线模型时，以表格文件描述设备与类型库，写入记入日志表
// 输入: 设备快照（handle, name, type_pattern, substation）
//       类型库快照（name, type_pattern, attributes）
// 输出: 写入日志 CSV（handle, attribute, value）
// ==========================================

use crate::domain::setting::{DeviceHandle, ProtectionDevice, TypeDefinition};
use crate::domain::types::{Region, SettingValue};
use crate::engine::model::{ModelError, NetworkModel, WriteStatus};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::{FileParser, UniversalFileParser};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// 一次已提交的属性写入
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedWrite {
    pub handle: String,
    pub attribute: String,
    pub value: String,
}

pub struct SnapshotModel {
    devices: Vec<ProtectionDevice>,
    types: Vec<TypeDefinition>,
    device_types: HashMap<DeviceHandle, usize>, // handle → types 下标（无类型定义时缺省）
    write_cache: bool,
    pending: Vec<RecordedWrite>,
    committed: Vec<RecordedWrite>,
}

impl SnapshotModel {
    pub fn new(devices: Vec<ProtectionDevice>, types: Vec<TypeDefinition>) -> Self {
        let mut by_pattern: HashMap<&str, usize> = HashMap::new();
        for (i, t) in types.iter().enumerate() {
            by_pattern.entry(t.pattern.as_str()).or_insert(i);
            by_pattern.entry(t.name.as_str()).or_insert(i);
        }
        let device_types = devices
            .iter()
            .filter_map(|d| {
                by_pattern
                    .get(d.type_pattern.as_str())
                    .map(|&i| (d.handle.clone(), i))
            })
            .collect();

        Self {
            devices,
            types,
            device_types,
            write_cache: false,
            pending: Vec::new(),
            committed: Vec::new(),
        }
    }

    /// 从快照文件加载
    ///
    /// # 参数
    /// - devices_file: 设备快照（.csv/.xlsx）
    /// - types_file: 类型库快照（.csv/.xlsx）
    /// - region: 设备所属区域
    pub fn load(devices_file: &Path, types_file: &Path, region: Region) -> ImportResult<Self> {
        let parser = UniversalFileParser;
        let mapper = FieldMapper;

        let devices = parser
            .parse_to_raw_records(devices_file)?
            .iter()
            .enumerate()
            .map(|(i, row)| mapper.map_to_device(row, i + 2, region))
            .collect::<ImportResult<Vec<_>>>()?;

        let types = parser
            .parse_to_raw_records(types_file)?
            .iter()
            .enumerate()
            .map(|(i, row)| mapper.map_to_type_definition(row, i + 2))
            .collect::<ImportResult<Vec<_>>>()?;

        info!(devices = devices.len(), types = types.len(), "模型快照加载完成");
        Ok(Self::new(devices, types))
    }

    /// 已提交的写入（按写入顺序）
    pub fn writes(&self) -> &[RecordedWrite] {
        &self.committed
    }

    /// 写出写入日志
    pub fn write_journal_csv(&self, path: &Path) -> ImportResult<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
        for w in &self.committed {
            writer
                .serialize(w)
                .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
        Ok(())
    }
}

impl NetworkModel for SnapshotModel {
    fn devices(&self) -> Result<Vec<ProtectionDevice>, ModelError> {
        Ok(self.devices.clone())
    }

    fn type_library(&self) -> Result<Vec<TypeDefinition>, ModelError> {
        Ok(self.types.clone())
    }

    fn write(
        &mut self,
        handle: &DeviceHandle,
        attribute_path: &str,
        value: &SettingValue,
    ) -> Result<WriteStatus, ModelError> {
        if !self.devices.iter().any(|d| &d.handle == handle) {
            return Err(ModelError::UnknownDevice(handle.as_str().to_string()));
        }

        if let Some(&i) = self.device_types.get(handle) {
            if !self.types[i].exposes(attribute_path) {
                return Ok(WriteStatus::Rejected(format!(
                    "类型 {} 无属性 {}",
                    self.types[i].name, attribute_path
                )));
            }
        }

        let write = RecordedWrite {
            handle: handle.as_str().to_string(),
            attribute: attribute_path.to_string(),
            value: value.to_string(),
        };
        if self.write_cache {
            self.pending.push(write);
        } else {
            self.committed.push(write);
        }
        Ok(WriteStatus::Accepted)
    }

    fn set_write_cache(&mut self, enabled: bool) {
        self.write_cache = enabled;
    }

    fn flush(&mut self) -> Result<(), ModelError> {
        debug!(pending = self.pending.len(), "提交缓存写入");
        self.committed.append(&mut self.pending);
        Ok(())
    }
}
