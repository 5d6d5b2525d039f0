//! Localized user-facing texts.
//!
//! Fluent resources for every supported language are embedded in the binary;
//! Portuguese (pt-BR) is the default and English is chosen for `en*` clients.

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::LazyLock;
use unic_langid::LanguageIdentifier;

/// Language used when the client's language is unknown or unsupported
pub const DEFAULT_LANGUAGE: &str = "pt-BR";

const RESOURCES: &[(&str, &str)] = &[
    ("pt-BR", include_str!("../locales/pt-BR/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

static LOCALIZATION_MANAGER: LazyLock<LocalizationManager> = LazyLock::new(|| {
    LocalizationManager::new().expect("Embedded locale resources should be valid")
});

/// Localization manager for the bot
pub struct LocalizationManager {
    bundles: HashMap<&'static str, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Build bundles for every embedded language
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();
        for (language, source) in RESOURCES {
            bundles.insert(*language, Self::create_bundle(language, source)?);
        }
        Ok(Self { bundles })
    }

    fn create_bundle(language: &str, source: &str) -> Result<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = language.parse()?;
        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid {language} resource: {errors:?}"))?;

        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Telegram renders the Unicode isolation marks as visible garbage
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Conflicting {language} messages: {errors:?}"))?;
        Ok(bundle)
    }

    /// Whether `key` exists in the given language
    pub fn has_message(&self, key: &str, language: &str) -> bool {
        self.bundles
            .get(language)
            .is_some_and(|bundle| bundle.has_message(key))
    }

    /// Format a message, falling back to the default language and then to the key itself
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&FluentArgs>,
    ) -> String {
        let bundle = self
            .bundles
            .get(language)
            .filter(|bundle| bundle.has_message(key))
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE));

        let Some((bundle, pattern)) = bundle.and_then(|bundle| {
            bundle
                .get_message(key)
                .and_then(|message| message.value())
                .map(|pattern| (bundle, pattern))
        }) else {
            return format!("Missing translation: {key}");
        };

        let mut errors = Vec::new();
        bundle.format_pattern(pattern, args, &mut errors).into_owned()
    }
}

/// Force the embedded resources to load, reporting parse errors instead of panicking later
pub fn init_localization() -> Result<()> {
    LocalizationManager::new()?;
    LazyLock::force(&LOCALIZATION_MANAGER);
    Ok(())
}

/// Map a Telegram `language_code` to a supported language
pub fn lang_from_code(language_code: Option<&str>) -> &'static str {
    match language_code {
        Some(code) if code.to_lowercase().starts_with("en") => "en",
        _ => DEFAULT_LANGUAGE,
    }
}

/// Localized message for the client's language code
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    LOCALIZATION_MANAGER.get_message_in_language(key, lang_from_code(language_code), None)
}

/// Localized message with string arguments
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let mut fluent_args = FluentArgs::new();
    for (name, value) in args {
        fluent_args.set(*name, FluentValue::from(*value));
    }
    LOCALIZATION_MANAGER.get_message_in_language(
        key,
        lang_from_code(language_code),
        Some(&fluent_args),
    )
}
