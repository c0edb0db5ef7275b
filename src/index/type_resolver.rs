// ==========================================
// 保护定值同步系统 - 设备类型解析
// ==========================================
// 职责: 原始类型名 → TypeDefinition（O(1)）
// 解析顺序:
// 1. 精确匹配（类型模式 / 类型名）
// 2. 大小写折叠
// 3. 去除已知后缀（如 "_Energex"）后再折叠匹配
// 红线: 解析失败不致命，由编排器转为设备级结果
// ==========================================

use crate::domain::setting::TypeDefinition;
use crate::index::{IndexBuildError, IndexResult};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 规范化时剥离的已知后缀
pub const DEFAULT_TYPE_SUFFIXES: [&str; 2] = ["_Energex", "_Ergon"];

#[derive(Debug)]
pub struct TypeResolver {
    definitions: Vec<TypeDefinition>,
    exact: HashMap<String, usize>,
    folded: HashMap<String, usize>,
    stripped: HashMap<String, usize>,
    suffixes: Vec<String>, // 已折叠为小写
}

impl TypeResolver {
    /// 使用默认后缀表构建
    pub fn build(definitions: Vec<TypeDefinition>) -> IndexResult<Self> {
        let suffixes: Vec<String> = DEFAULT_TYPE_SUFFIXES.iter().map(|s| s.to_string()).collect();
        Self::build_with_suffixes(definitions, &suffixes)
    }

    /// 构建类型索引
    ///
    /// # 参数
    /// - definitions: 模型类型库中的全部类型定义
    /// - suffixes: 规范化时剥离的后缀
    ///
    /// # 返回
    /// - Err: 类型定义缺少类型模式
    pub fn build_with_suffixes(
        definitions: Vec<TypeDefinition>,
        suffixes: &[String],
    ) -> IndexResult<Self> {
        let mut resolver = Self {
            definitions: Vec::with_capacity(definitions.len()),
            exact: HashMap::new(),
            folded: HashMap::new(),
            stripped: HashMap::new(),
            suffixes: suffixes
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        for definition in definitions {
            if definition.pattern.trim().is_empty() {
                return Err(IndexBuildError::EmptyTypePattern {
                    name: definition.name.clone(),
                });
            }

            let pos = resolver.definitions.len();
            // 类型模式优先于类型名：先登记模式
            let keys = [definition.pattern.clone(), definition.name.clone()];
            for key in keys.iter().filter(|k| !k.is_empty()) {
                if let Some(&existing) = resolver.exact.get(key) {
                    if existing != pos {
                        warn!(key = %key, kept = %resolver.definitions[existing].name, "类型键重复，保留先出现的定义");
                    }
                    continue;
                }
                resolver.exact.insert(key.clone(), pos);

                let folded = key.to_lowercase();
                let stripped = resolver.strip_suffix(&folded).to_string();
                resolver.folded.entry(folded).or_insert(pos);
                resolver.stripped.entry(stripped).or_insert(pos);
            }

            resolver.definitions.push(definition);
        }

        info!(types = resolver.definitions.len(), "类型索引构建完成");
        Ok(resolver)
    }

    fn strip_suffix<'a>(&self, folded: &'a str) -> &'a str {
        for suffix in &self.suffixes {
            if let Some(base) = folded.strip_suffix(suffix.as_str()) {
                if !base.is_empty() {
                    return base;
                }
            }
        }
        folded
    }

    /// 解析类型名
    ///
    /// # 返回
    /// - Some: 命中的类型定义
    /// - None: 三级规范化后仍无匹配
    pub fn resolve(&self, type_pattern: &str) -> Option<&TypeDefinition> {
        let raw = type_pattern.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(&pos) = self.exact.get(raw) {
            return Some(&self.definitions[pos]);
        }

        let folded = raw.to_lowercase();
        if let Some(&pos) = self.folded.get(&folded) {
            debug!(type_pattern = %raw, "类型经大小写折叠解析");
            return Some(&self.definitions[pos]);
        }

        let stripped = self.strip_suffix(&folded);
        let hit = self.stripped.get(stripped).map(|&pos| &self.definitions[pos]);
        if hit.is_some() {
            debug!(type_pattern = %raw, "类型经后缀剥离解析");
        }
        hit
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TypeResolver {
        TypeResolver::build(vec![
            TypeDefinition::new("SEL351", "T1"),
            TypeDefinition::new("MiCOM P123", "P123_Energex"),
            TypeDefinition::new("Fuse", "FUSE"),
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_match_by_pattern_and_name() {
        let r = resolver();
        assert_eq!(r.resolve("T1").unwrap().name, "SEL351");
        assert_eq!(r.resolve("SEL351").unwrap().pattern, "T1");
    }

    #[test]
    fn test_case_fold() {
        let r = resolver();
        assert_eq!(r.resolve("t1").unwrap().name, "SEL351");
        assert_eq!(r.resolve("fuse").unwrap().pattern, "FUSE");
    }

    #[test]
    fn test_known_suffix_stripping() {
        let r = resolver();
        // 输入带后缀，库中无后缀
        assert_eq!(r.resolve("T1_Energex").unwrap().name, "SEL351");
        // 库中带后缀，输入无后缀
        assert_eq!(r.resolve("p123").unwrap().name, "MiCOM P123");
        assert_eq!(r.resolve("P123_ergon").unwrap().name, "MiCOM P123");
    }

    #[test]
    fn test_unknown_type_not_found() {
        let r = resolver();
        assert!(r.resolve("T9").is_none());
        assert!(r.resolve("").is_none());
    }

    #[test]
    fn test_pattern_wins_over_later_name_collision() {
        let r = TypeResolver::build(vec![
            TypeDefinition::new("A", "T1"),
            TypeDefinition::new("T1", "T2"),
        ])
        .unwrap();
        assert_eq!(r.resolve("T1").unwrap().name, "A");
        assert_eq!(r.resolve("T2").unwrap().name, "T1");
    }

    #[test]
    fn test_empty_pattern_is_fatal() {
        let result = TypeResolver::build(vec![TypeDefinition::new("Broken", " ")]);
        assert!(matches!(result, Err(IndexBuildError::EmptyTypePattern { .. })));
    }

    #[test]
    fn test_custom_suffixes() {
        let r = TypeResolver::build_with_suffixes(
            vec![TypeDefinition::new("Relay", "R1")],
            &["_v2".to_string()],
        )
        .unwrap();
        assert_eq!(r.resolve("R1_V2").unwrap().name, "Relay");
        assert!(r.resolve("R1_Energex").is_none());
    }
}
