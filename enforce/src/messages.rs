//! Localized reason text for denies and blocks.
//!
//! Templates are embedded and named `<locale>/<key>`. A template that fails to
//! render falls back to English, then to the bare key.

use std::fmt;

use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;
use tracing::warn;

/// Language of user-facing reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    /// Accepts `en`, `zh`, and region variants such as `zh-CN` or `en_US`.
    pub fn parse(raw: &str) -> Option<Self> {
        let lang = raw
            .trim()
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    ToolBeforeDelegation,
    UnmappedCommand,
    MissingDelegation,
    DelegateMismatch,
    ArtifactBaseMissing,
    ArtifactMissing,
    ArtifactAnyMissing,
    SystemFault,
}

impl MessageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolBeforeDelegation => "tool_before_delegation",
            Self::UnmappedCommand => "unmapped_command",
            Self::MissingDelegation => "missing_delegation",
            Self::DelegateMismatch => "delegate_mismatch",
            Self::ArtifactBaseMissing => "artifact_base_missing",
            Self::ArtifactMissing => "artifact_missing",
            Self::ArtifactAnyMissing => "artifact_any_missing",
            Self::SystemFault => "system_fault",
        }
    }
}

const CATALOG: &[(&str, &str)] = &[
    (
        "en/tool_before_delegation",
        "{{ command }} must delegate to `{{ required }}` first. `{{ tool }}` is not allowed \
         before delegation; invoke the Task tool with subagent_type=\"{{ required }}\".",
    ),
    (
        "zh/tool_before_delegation",
        "{{ command }} 必须先委派给 `{{ required }}`。委派前不允许使用 `{{ tool }}`；\
         请调用 Task 工具并设置 subagent_type=\"{{ required }}\"。",
    ),
    (
        "en/unmapped_command",
        "{{ command }} has no enforcement rule. Add it to command_mapping in {{ config_path }} \
         or use a mapped /gsd: command.",
    ),
    (
        "zh/unmapped_command",
        "{{ command }} 没有对应的执行规则。请在 {{ config_path }} 的 command_mapping 中添加它，\
         或使用已映射的 /gsd: 命令。",
    ),
    (
        "en/missing_delegation",
        "{{ command }} finished without delegating to `{{ required }}`. Invoke the Task tool \
         with subagent_type=\"{{ required }}\" before ending the turn.",
    ),
    (
        "zh/missing_delegation",
        "{{ command }} 结束前没有委派给 `{{ required }}`。请在结束本轮前调用 Task 工具并设置 \
         subagent_type=\"{{ required }}\"。",
    ),
    (
        "en/delegate_mismatch",
        "{{ command }} delegated to `{{ actual }}` but requires `{{ required }}`. Re-run the \
         command and delegate to `{{ required }}`.",
    ),
    (
        "zh/delegate_mismatch",
        "{{ command }} 委派给了 `{{ actual }}`，但要求委派给 `{{ required }}`。\
         请重新运行该命令并委派给 `{{ required }}`。",
    ),
    (
        "en/artifact_base_missing",
        "{{ command }} expected artifacts under {{ base_dir }}, but that directory does not exist.",
    ),
    (
        "zh/artifact_base_missing",
        "{{ command }} 期望在 {{ base_dir }} 下生成产物，但该目录不存在。",
    ),
    (
        "en/artifact_missing",
        "{{ command }} did not write a file matching `{{ pattern }}` under {{ base_dir }} \
         during this turn.",
    ),
    (
        "zh/artifact_missing",
        "{{ command }} 本轮没有在 {{ base_dir }} 下写入匹配 `{{ pattern }}` 的文件。",
    ),
    (
        "en/artifact_any_missing",
        "{{ command }} did not write any file matching one of [{{ patterns | join(\", \") }}] \
         under {{ base_dir }} during this turn.",
    ),
    (
        "zh/artifact_any_missing",
        "{{ command }} 本轮没有在 {{ base_dir }} 下写入匹配 [{{ patterns | join(\", \") }}] \
         中任一模式的文件。",
    ),
    ("en/system_fault", "GSD enforcement hook error: {{ detail }}"),
    ("zh/system_fault", "GSD 执行钩子错误：{{ detail }}"),
];

/// Template engine over the embedded catalog.
pub struct Messages {
    env: Environment<'static>,
    locale: Locale,
}

impl Messages {
    pub fn new(locale: Locale) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for &(name, source) in CATALOG {
            env.add_template(name, source)
                .expect("message template should be valid");
        }
        Self { env, locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Render `key` with `ctx` (built with [`minijinja::context!`]).
    pub fn render(&self, key: MessageKey, ctx: Value) -> String {
        let err = match self.render_in(self.locale, key, &ctx) {
            Ok(text) => return text,
            Err(err) => err,
        };
        warn!(key = key.as_str(), locale = %self.locale, error = %err, "message render failed");
        if self.locale != Locale::En {
            if let Ok(text) = self.render_in(Locale::En, key, &ctx) {
                return text;
            }
        }
        key.as_str().to_string()
    }

    fn render_in(
        &self,
        locale: Locale,
        key: MessageKey,
        ctx: &Value,
    ) -> Result<String, minijinja::Error> {
        let name = format!("{}/{}", locale, key.as_str());
        self.env.get_template(&name)?.render(ctx)
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::new(Locale::default())
    }
}
