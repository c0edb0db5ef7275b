// ==========================================
// 保护定值同步系统 - 开关别名表
// ==========================================
// 职责: 模型设备名 ↔ 定值库名称 的双向查找
// 文件格式（两种均可）:
// - model_name,settings_name[,substation]
// - PROJECT,GRID,SUBSTATION,CB_NAME,NEW_NAME
// 说明: 无别名是常态，调用方回退到原始设备名
// ==========================================

use crate::importer::{FieldMapper, FileParser, UniversalFileParser};
use crate::index::IndexResult;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// 别名表中的一条映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltNameEntry {
    pub model_name: String,        // 模型中的设备名
    pub settings_name: String,     // 定值库中使用的名称
    pub substation: Option<String>, // 限定变电站（可选）
}

#[derive(Debug, Default)]
pub struct AltNameTable {
    global: HashMap<String, String>,
    scoped: HashMap<(String, String), String>,
    reverse: HashMap<String, String>,
}

impl AltNameTable {
    /// 从别名文件加载
    ///
    /// # 返回
    /// - 文件不存在: 空表（记录警告）
    /// - Err: 文件存在但无法解析
    pub fn load(path: &Path) -> IndexResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "别名文件不存在，按无别名处理");
            return Ok(Self::default());
        }

        let rows = UniversalFileParser.parse_to_raw_records(path)?;
        let mapper = FieldMapper;
        let mut entries = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            // 表头占第 1 行
            if let Some(entry) = mapper.map_to_alt_name(row, i + 2)? {
                entries.push(entry);
            }
        }

        let table = Self::from_entries(entries);
        info!(path = %path.display(), entries = table.len(), "别名表加载完成");
        Ok(table)
    }

    /// 从映射条目构建，同一模型名重复时保留先出现者
    ///
    /// 带变电站的条目只进入限定表，不对其它变电站生效
    pub fn from_entries(entries: Vec<AltNameEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            match &entry.substation {
                Some(sub) => {
                    table
                        .scoped
                        .entry((sub.clone(), entry.model_name.clone()))
                        .or_insert_with(|| entry.settings_name.clone());
                }
                None => {
                    if let Some(existing) = table.global.get(&entry.model_name) {
                        if existing != &entry.settings_name {
                            warn!(model_name = %entry.model_name, kept = %existing, ignored = %entry.settings_name, "别名重复");
                        }
                    } else {
                        table
                            .global
                            .insert(entry.model_name.clone(), entry.settings_name.clone());
                    }
                }
            }

            table
                .reverse
                .entry(entry.settings_name)
                .or_insert(entry.model_name);
        }
        table
    }

    /// 查找别名（无变电站限定）
    pub fn lookup(&self, model_name: &str) -> Option<&str> {
        self.global.get(model_name).map(String::as_str)
    }

    /// 查找别名：变电站限定条目优先，其次全局条目
    pub fn lookup_in(&self, model_name: &str, substation: Option<&str>) -> Option<&str> {
        if let Some(sub) = substation {
            if let Some(name) = self.scoped.get(&(sub.to_string(), model_name.to_string())) {
                return Some(name.as_str());
            }
        }
        self.lookup(model_name)
    }

    /// 解析为定值库名称；无别名时原样返回
    pub fn resolve<'a>(&'a self, model_name: &'a str) -> Cow<'a, str> {
        match self.lookup(model_name) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Borrowed(model_name),
        }
    }

    /// 反向查找：定值库名称 → 模型设备名
    pub fn reverse(&self, settings_name: &str) -> Option<&str> {
        self.reverse.get(settings_name).map(String::as_str)
    }

    /// 条目数（全局 + 变电站限定）
    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.scoped.is_empty()
    }
}
