//! 检测器注册表
//!
//! 将检测器类型标签映射到构造函数，并根据 [`CheckerConfig`] 构建检测器实例。
//! 注册表是在启动时显式创建并按引用传递的普通值，不存在进程级全局状态。

use crate::config::CheckerConfig;
use crate::error::BuildError;
use crate::health::checker::Checker;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 检测器构造函数类型
pub type CheckerConstructor =
    Arc<dyn Fn(&CheckerConfig) -> anyhow::Result<Arc<dyn Checker>> + Send + Sync>;

/// 检测器注册表
#[derive(Default, Clone)]
pub struct CheckerRegistry {
    constructors: HashMap<String, CheckerConstructor>,
}

impl CheckerRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册检测器构造函数
    ///
    /// 同一类型重复注册时后注册者覆盖先注册者。
    pub fn register<F>(&mut self, checker_type: impl Into<String>, constructor: F)
    where
        F: Fn(&CheckerConfig) -> anyhow::Result<Arc<dyn Checker>> + Send + Sync + 'static,
    {
        let checker_type = checker_type.into();
        if self
            .constructors
            .insert(checker_type.clone(), Arc::new(constructor))
            .is_some()
        {
            warn!("检测器类型 {} 已注册，覆盖原有构造函数", checker_type);
        } else {
            debug!("注册检测器类型: {}", checker_type);
        }
    }

    /// 是否已注册指定类型
    pub fn contains(&self, checker_type: &str) -> bool {
        self.constructors.contains_key(checker_type)
    }

    /// 已注册的类型（按字母排序）
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }

    /// 根据配置构建检测器
    ///
    /// # 参数
    /// * `config` - 检测器配置
    ///
    /// # 返回
    /// * `Result<Arc<dyn Checker>, BuildError>` - 检测器实例或构建错误
    pub fn build(&self, config: &CheckerConfig) -> Result<Arc<dyn Checker>, BuildError> {
        let constructor = self.constructors.get(&config.checker_type).ok_or_else(|| {
            BuildError::UnknownCheckerType {
                checker_type: config.checker_type.clone(),
            }
        })?;

        let checker = constructor(config).map_err(|source| BuildError::Constructor {
            name: config.name.clone(),
            checker_type: config.checker_type.clone(),
            source,
        })?;

        debug!("构建检测器: {} (类型 {})", config.name, config.checker_type);
        Ok(checker)
    }
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
