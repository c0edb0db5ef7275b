// ==========================================
// 保护定值同步系统 - 更新编排器
// ==========================================
// 用途: 按输入顺序逐台处理设备，每台恰好产生一个 UpdateResult
// 单台设备状态机:
//   start → 类型解析 → 规则获取 → 候选匹配 → 决胜 → 规则应用 → [UPDATED]
//   类型/规则未解析 → [TYPE_UNRESOLVED]
//   无候选 → [NOT_FOUND_IN_SOURCE]
//   任意步骤出错或 panic → [FAILED]（记录设备全部属性，继续下一台）
// 红线: 单台设备失败不影响后续设备；严格串行
// ==========================================

use crate::domain::setting::{ProtectionDevice, ResolvedSetting};
use crate::domain::types::{Region, SettingValue, UpdateStatus};
use crate::domain::update_result::{UpdateOutcome, UpdateResult};
use crate::engine::error::DeviceError;
use crate::engine::matching::{strategy_for, MatchingStrategy, TieBreakPolicy};
use crate::engine::model::{NetworkModel, WriteStatus};
use crate::index::{AltNameTable, SettingIndex, TypeResolver};
use crate::rules::{CacheStats, RuleStore};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 进度日志间隔（台）
const PROGRESS_INTERVAL: usize = 10;

// ==========================================
// OrchestratorOptions - 编排选项
// ==========================================
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub tie_break: TieBreakPolicy,         // 多候选决胜策略
    pub batch_write_cache: bool,           // 批量写缓存提示
    pub mark_failed_out_of_service: bool,  // 失败设备置为退出运行
    pub out_of_service_attribute: String,  // 退出运行属性路径
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            tie_break: TieBreakPolicy::default(),
            batch_write_cache: true,
            mark_failed_out_of_service: false,
            out_of_service_attribute: "outserv".to_string(),
        }
    }
}

// ==========================================
// RunSummary - 运行汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub updated: usize,
    pub not_found_in_source: usize,
    pub type_unresolved: usize,
    pub failed: usize,
    pub informational: usize,
    pub partial_failures: usize, // 已更新但有字段被拒绝
    pub ambiguous: usize,        // 决胜后仍并列
}

impl RunSummary {
    fn record(&mut self, result: &UpdateResult) {
        self.total += 1;
        match result.status() {
            UpdateStatus::Updated => self.updated += 1,
            UpdateStatus::NotFoundInSource => self.not_found_in_source += 1,
            UpdateStatus::TypeUnresolved => self.type_unresolved += 1,
            UpdateStatus::Failed => self.failed += 1,
            UpdateStatus::Informational => self.informational += 1,
        }
        if result.has_partial_failure() {
            self.partial_failures += 1;
        }
        if let UpdateOutcome::Updated { ambiguous_candidates, .. } = &result.outcome {
            if !ambiguous_candidates.is_empty() {
                self.ambiguous += 1;
            }
        }
    }

    /// 两类"未找到"合计
    pub fn not_found(&self) -> usize {
        self.not_found_in_source + self.type_unresolved
    }
}

/// 一次运行的输出
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,             // 本次运行 ID（日志关联用）
    pub results: Vec<UpdateResult>, // 按处理顺序
    pub summary: RunSummary,
    pub cache_stats: CacheStats,
}

// ==========================================
// UpdateOrchestrator - 更新编排器
// ==========================================
pub struct UpdateOrchestrator {
    strategy: Box<dyn MatchingStrategy>,
    options: OrchestratorOptions,
}

impl UpdateOrchestrator {
    /// 按区域选定匹配策略
    pub fn new(region: Region, options: OrchestratorOptions) -> Self {
        Self::with_strategy(strategy_for(region), options)
    }

    pub fn with_strategy(strategy: Box<dyn MatchingStrategy>, options: OrchestratorOptions) -> Self {
        Self { strategy, options }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// 处理全部设备
    ///
    /// # 参数
    /// - devices: 本次运行的设备（匹配成功后填充 settings）
    /// - index / types / alt_names: 运行前构建的只读索引
    /// - rules: 运行级规则库（缓存随处理增长）
    /// - model: 外部网络模型
    ///
    /// # 返回
    /// 每台设备一个结果，顺序与输入一致
    pub fn run(
        &self,
        devices: &mut [ProtectionDevice],
        index: &SettingIndex,
        types: &TypeResolver,
        alt_names: &AltNameTable,
        rules: &mut RuleStore,
        model: &mut dyn NetworkModel,
    ) -> RunReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let total = devices.len();
        info!(
            run_id = %run_id,
            devices = total,
            strategy = self.strategy.name(),
            tie_break = %self.options.tie_break,
            batch_write_cache = self.options.batch_write_cache,
            "开始更新设备定值"
        );

        if self.options.batch_write_cache {
            model.set_write_cache(true);
        }

        let mut results = Vec::with_capacity(total);
        let mut summary = RunSummary::default();

        for (i, device) in devices.iter_mut().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                info!(current = i + 1, total, "处理进度");
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.process_device(device, index, types, alt_names, rules, model)
            }))
            .unwrap_or_else(|payload| Err(DeviceError::Panicked(panic_message(payload.as_ref()))));

            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    error!(
                        device = %device.name,
                        error = %err,
                        context = %device.diagnostic_context(),
                        "设备处理失败"
                    );
                    if self.options.mark_failed_out_of_service {
                        self.mark_out_of_service(device, model);
                    }
                    UpdateResult::failed(device, err.to_string())
                }
            };

            debug!(device = %device.name, status = %result.status(), "设备处理完成");
            summary.record(&result);
            results.push(result);
        }

        if self.options.batch_write_cache {
            if let Err(e) = model.flush() {
                error!(error = %e, "批量写缓存提交失败");
            }
            model.set_write_cache(false);
        }

        info!(
            run_id = %run_id,
            total = summary.total,
            updated = summary.updated,
            not_found = summary.not_found(),
            failed = summary.failed,
            partial_failures = summary.partial_failures,
            ambiguous = summary.ambiguous,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "设备定值更新完成"
        );

        RunReport {
            run_id,
            results,
            summary,
            cache_stats: rules.cache_stats(),
        }
    }

    /// 单台设备流水线
    fn process_device(
        &self,
        device: &mut ProtectionDevice,
        index: &SettingIndex,
        types: &TypeResolver,
        alt_names: &AltNameTable,
        rules: &mut RuleStore,
        model: &mut dyn NetworkModel,
    ) -> Result<UpdateResult, DeviceError> {
        // 1. 类型解析（先于匹配）
        let definition = match types.resolve(&device.type_pattern) {
            Some(d) => d,
            None => {
                debug!(device = %device.name, type_pattern = %device.type_pattern, "类型无法解析");
                return Ok(UpdateResult::type_unresolved(device));
            }
        };

        // 2. 规则获取（任何写入之前）
        let rule_set = match rules.get_rules(&definition.pattern)? {
            Some(r) => r,
            None => {
                debug!(device = %device.name, type_pattern = %definition.pattern, "类型无映射规则");
                return Ok(UpdateResult::type_unresolved(device));
            }
        };
        if rule_set.is_empty() {
            return Ok(UpdateResult::informational(
                device,
                format!("类型 {} 的映射文件无有效规则，未写入", definition.pattern),
            ));
        }

        // 3. 候选匹配 + 决胜
        let candidates = self.strategy.find_candidates(device, index, alt_names);
        let choice = match self.options.tie_break.select(&candidates) {
            Some(c) => c,
            None => return Ok(UpdateResult::not_found_in_source(device)),
        };
        if choice.is_ambiguous() {
            warn!(
                device = %device.name,
                selected = %choice.selected.record_id,
                candidates = ?choice.ambiguous,
                "多条定值记录无法区分，需人工复核"
            );
        }

        for rule in rule_set.iter().filter(|r| !definition.exposes(&r.destination)) {
            warn!(device = %device.name, attribute = %rule.destination, type_name = %definition.name, "类型库未声明该属性");
        }

        // 4. 规则应用
        let fields = rules.apply(choice.selected, &rule_set, &device.handle, model)?;

        device.settings = Some(ResolvedSetting {
            record_id: choice.selected.record_id.clone(),
            date_setting: choice.selected.date_setting,
        });

        Ok(UpdateResult::updated(device, choice.selected, fields, choice.ambiguous))
    }

    /// 失败设备置为退出运行（尽力而为，失败只记日志）
    fn mark_out_of_service(&self, device: &ProtectionDevice, model: &mut dyn NetworkModel) {
        let attribute = self.options.out_of_service_attribute.as_str();
        let written = catch_unwind(AssertUnwindSafe(|| {
            model.write(&device.handle, attribute, &SettingValue::Integer(1))
        }));
        match written {
            Ok(Ok(WriteStatus::Accepted)) => {
                info!(device = %device.name, attribute, "失败设备已置为退出运行");
            }
            Ok(Ok(WriteStatus::Rejected(reason))) => {
                warn!(device = %device.name, attribute, reason = %reason, "退出运行写入被拒绝");
            }
            Ok(Err(e)) => warn!(device = %device.name, error = %e, "退出运行写入失败"),
            Err(payload) => warn!(device = %device.name, panic = %panic_message(payload.as_ref()), "退出运行写入异常"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::setting::{DeviceHandle, SettingRecord, TypeDefinition};
    use crate::engine::model::ModelError;
    use crate::rules::{CurveMapping, TypeMappingEntry};
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryModel {
        writes: Vec<(String, String)>,
        panic_on: Option<String>,
        cache_toggles: Vec<bool>,
    }

    impl NetworkModel for MemoryModel {
        fn devices(&self) -> Result<Vec<ProtectionDevice>, ModelError> {
            Ok(vec![])
        }
        fn type_library(&self) -> Result<Vec<TypeDefinition>, ModelError> {
            Ok(vec![])
        }
        fn write(
            &mut self,
            handle: &DeviceHandle,
            path: &str,
            _value: &SettingValue,
        ) -> Result<WriteStatus, ModelError> {
            if self.panic_on.as_deref() == Some(handle.as_str()) {
                panic!("模型崩溃");
            }
            self.writes.push((handle.0.clone(), path.to_string()));
            Ok(WriteStatus::Accepted)
        }
        fn set_write_cache(&mut self, enabled: bool) {
            self.cache_toggles.push(enabled);
        }
    }

    struct Fixture {
        _dir: TempDir,
        index: SettingIndex,
        types: TypeResolver,
        rules: RuleStore,
    }

    fn fixture(rule_rows: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("t1.csv"), format!("source_field,destination\n{}", rule_rows)).unwrap();
        let rules = RuleStore::from_parts(
            vec![TypeMappingEntry {
                type_pattern: "T1".into(),
                file_name: "t1".into(),
                classification: None,
            }],
            dir.path(),
            CurveMapping::default(),
        );
        let index = SettingIndex::build(
            vec![SettingRecord::new("1", "NIP1A+B", "T1").with_field("Ipset", "1.5")],
            Region::Energex,
        )
        .unwrap();
        let types = TypeResolver::build(vec![TypeDefinition::new("SEL351", "T1")]).unwrap();
        Fixture { _dir: dir, index, types, rules }
    }

    fn device(name: &str, type_pattern: &str) -> ProtectionDevice {
        ProtectionDevice::new(name, name, type_pattern, Region::Energex)
    }

    #[test]
    fn test_combined_key_device_updated() {
        let mut f = fixture("Ipset,e:Ipset\n");
        let mut devices = vec![device("NIP1A", "T1")];
        let mut model = MemoryModel::default();

        let report = UpdateOrchestrator::new(Region::Energex, OrchestratorOptions::default()).run(
            &mut devices,
            &f.index,
            &f.types,
            &AltNameTable::default(),
            &mut f.rules,
            &mut model,
        );

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status(), UpdateStatus::Updated);
        assert_eq!(devices[0].settings.as_ref().unwrap().record_id, "1");
        assert_eq!(model.writes, vec![("NIP1A".to_string(), "e:Ipset".to_string())]);
        assert_eq!(model.cache_toggles, vec![true, false]);
    }

    #[test]
    fn test_type_unresolved_before_matching() {
        let mut f = fixture("Ipset,e:Ipset\n");
        let mut devices = vec![device("NIP1A", "T9")];
        let mut model = MemoryModel::default();

        let report = UpdateOrchestrator::new(Region::Energex, OrchestratorOptions::default()).run(
            &mut devices,
            &f.index,
            &f.types,
            &AltNameTable::default(),
            &mut f.rules,
            &mut model,
        );

        assert_eq!(report.results[0].status(), UpdateStatus::TypeUnresolved);
        assert!(devices[0].settings.is_none());
        assert!(model.writes.is_empty());
    }

    #[test]
    fn test_panic_isolated_to_one_device() {
        let mut f = fixture("Ipset,e:Ipset\n");
        let mut devices = vec![device("NIP1A", "T1"), device("NIP1B", "T1"), device("UNKNOWN99", "T1")];
        let mut model = MemoryModel {
            panic_on: Some("NIP1A".into()),
            ..Default::default()
        };

        let report = UpdateOrchestrator::new(Region::Energex, OrchestratorOptions::default()).run(
            &mut devices,
            &f.index,
            &f.types,
            &AltNameTable::default(),
            &mut f.rules,
            &mut model,
        );

        let statuses: Vec<UpdateStatus> = report.results.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![UpdateStatus::Failed, UpdateStatus::Updated, UpdateStatus::NotFoundInSource]
        );
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.not_found(), 1);
        assert!(report.results[0].error_detail().unwrap().contains("模型崩溃"));
    }

    #[test]
    fn test_empty_rule_set_is_informational() {
        let mut f = fixture("");
        let mut devices = vec![device("NIP1A", "T1")];
        let mut model = MemoryModel::default();

        let report = UpdateOrchestrator::new(Region::Energex, OrchestratorOptions::default()).run(
            &mut devices,
            &f.index,
            &f.types,
            &AltNameTable::default(),
            &mut f.rules,
            &mut model,
        );
        assert_eq!(report.results[0].status(), UpdateStatus::Informational);
    }

    #[test]
    fn test_failed_device_marked_out_of_service() {
        let mut f = fixture("Ipset,e:Ipset\n");
        // 映射规则无法加载 → 设备失败
        f.rules = RuleStore::from_parts(
            vec![TypeMappingEntry {
                type_pattern: "T1".into(),
                file_name: "missing".into(),
                classification: None,
            }],
            "/nonexistent",
            CurveMapping::default(),
        );
        let mut devices = vec![device("NIP1A", "T1")];
        let mut model = MemoryModel::default();
        let options = OrchestratorOptions {
            mark_failed_out_of_service: true,
            batch_write_cache: false,
            ..Default::default()
        };

        let report = UpdateOrchestrator::new(Region::Energex, options).run(
            &mut devices,
            &f.index,
            &f.types,
            &AltNameTable::default(),
            &mut f.rules,
            &mut model,
        );

        assert_eq!(report.results[0].status(), UpdateStatus::Failed);
        assert_eq!(model.writes, vec![("NIP1A".to_string(), "outserv".to_string())]);
        assert!(model.cache_toggles.is_empty());
    }

    #[test]
    fn test_writes_follow_rule_order() {
        let mut f = fixture("Ipset,e:First\nIpset,e:Second\n");
        let mut devices = vec![device("NIP1B", "T1")];
        let mut model = MemoryModel::default();

        UpdateOrchestrator::new(Region::Energex, OrchestratorOptions::default()).run(
            &mut devices,
            &f.index,
            &f.types,
            &AltNameTable::default(),
            &mut f.rules,
            &mut model,
        );
        let paths: Vec<&str> = model.writes.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(paths, vec!["e:First", "e:Second"]);
    }
}
