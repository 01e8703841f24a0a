// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持中文（默认）和英文，其它语言代码回落到中文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 默认语言（同时是缺失键的回退语言）
pub const DEFAULT_LOCALE: &str = "zh-CN";

/// 已提供翻译的语言
pub const SUPPORTED_LOCALES: [&str; 2] = ["zh-CN", "en"];

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 归一化语言代码
///
/// 英文变体（en / en-US / en_GB ...）统一为 "en"，其余一律回落到默认语言
pub fn normalize_locale(locale: &str) -> &'static str {
    let code = locale.trim().to_ascii_lowercase();
    if code == "en" || code.starts_with("en-") || code.starts_with("en_") {
        "en"
    } else {
        DEFAULT_LOCALE
    }
}

/// 设置语言，返回实际生效的语言代码
///
/// # 参数
/// - locale: 语言代码（配置中的原始值即可）
pub fn set_locale(locale: &str) -> &'static str {
    let applied = normalize_locale(locale);
    rust_i18n::set_locale(applied);
    applied
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use ops_checklist::i18n::t;
/// let msg = t("common.success");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use ops_checklist::i18n::t_with_args;
/// let msg = t_with_args("checkout.report_summary", &[("succeeded", "2"), ("failed", "1")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}
