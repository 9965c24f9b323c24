// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{borrow::Cow, fmt::Display, str::FromStr};

use crate::configuration::supported::ConfigurationKey;

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSourceOrigin {
    Default,
    EnvVar,
    Code,
}

#[derive(Debug, PartialEq)]
pub(crate) struct ConfigKey<T> {
    pub(crate) value: T,
    pub(crate) origin: ConfigSourceOrigin,
}

/// Compose multiple sources of configuration together.
///
/// The higher precedence sources are the first ones in the list.
pub(crate) struct CompositeSource {
    sources: Vec<Box<dyn ConfigurationSource>>,
}

impl CompositeSource {
    pub fn new() -> Self {
        CompositeSource {
            sources: Vec::new(),
        }
    }

    pub fn add_source<C: ConfigurationSource + 'static>(&mut self, source: C) {
        self.sources.push(Box::new(source));
    }
}

#[allow(unused)]
#[derive(Debug, PartialEq)]
pub(crate) struct CompositeParseError {
    desired_type: &'static str,
    error: Cow<'static, str>,
    value: String,
    origin: ConfigSourceOrigin,
}

#[derive(Debug, PartialEq)]
pub(crate) struct CompositeConfigSourceResult<T> {
    pub name: ConfigurationKey,
    pub value: Option<ConfigKey<T>>,
    pub errors: Vec<CompositeParseError>,
}

impl CompositeSource {
    pub fn get(&self, key: ConfigurationKey) -> CompositeConfigSourceResult<String> {
        self.get_parse(key)
    }

    /// Get a value from the configuration sources.
    ///
    /// Iterates over sources in order of precedence and returns the first
    /// value that parses. Parse failures are collected with the source they
    /// came from so callers can log them.
    pub fn get_parse<T: FromStr<Err = impl Display>>(
        &self,
        name: ConfigurationKey,
    ) -> CompositeConfigSourceResult<T> {
        let mut errors = Vec::new();
        for s in &self.sources {
            match s.get(name.as_str()).and_then(|value| {
                value
                    .parse::<T>()
                    .map_err(|e| ConfigSourceError::FailedParsing {
                        desired_type: std::any::type_name::<T>(),
                        error: Cow::Owned(e.to_string()),
                        value,
                    })
            }) {
                Ok(v) => {
                    return CompositeConfigSourceResult {
                        name,
                        value: Some(ConfigKey {
                            value: v,
                            origin: s.origin(),
                        }),
                        errors,
                    };
                }
                Err(ConfigSourceError::Missing) => continue,
                Err(ConfigSourceError::FailedParsing {
                    error,
                    value,
                    desired_type,
                }) => {
                    errors.push(CompositeParseError {
                        desired_type,
                        error,
                        value,
                        origin: s.origin(),
                    });
                }
            }
        }
        CompositeConfigSourceResult {
            name,
            value: None,
            errors,
        }
    }
}

pub(crate) enum ConfigSourceError {
    Missing,
    FailedParsing {
        desired_type: &'static str,
        error: Cow<'static, str>,
        // String representation of the value we failed to parse
        value: String,
    },
}

type ConfigSourceResult<T> = Result<T, ConfigSourceError>;

/// Represents a single source of configuration values
pub(crate) trait ConfigurationSource {
    fn origin(&self) -> ConfigSourceOrigin;

    fn get(&self, key: &'static str) -> ConfigSourceResult<String>;
}

pub(crate) struct EnvSource;

impl ConfigurationSource for EnvSource {
    fn origin(&self) -> ConfigSourceOrigin {
        ConfigSourceOrigin::EnvVar
    }

    fn get(&self, key: &'static str) -> ConfigSourceResult<String> {
        std::env::var(key).map_err(|_| ConfigSourceError::Missing)
    }
}

/// A source of configuration backed by a HashMap.
///
/// Used for code-level overrides set through the builder, and as a test
/// double.
pub(crate) struct HashMapSource {
    map: std::collections::HashMap<String, String>,
    origin: ConfigSourceOrigin,
}

impl HashMapSource {
    pub(crate) fn from_iter<U: ToString, V: ToString, T: IntoIterator<Item = (U, V)>>(
        map: T,
        origin: ConfigSourceOrigin,
    ) -> Self {
        HashMapSource {
            map: map
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            origin,
        }
    }
}

impl ConfigurationSource for HashMapSource {
    fn origin(&self) -> ConfigSourceOrigin {
        self.origin
    }

    fn get(&self, key: &'static str) -> ConfigSourceResult<String> {
        self.map.get(key).cloned().ok_or(ConfigSourceError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CompositeConfigSourceResult, CompositeSource, ConfigKey, ConfigSourceOrigin, HashMapSource,
    };
    use crate::configuration::supported::ConfigurationKey;

    #[test]
    fn test_composite_source_single_origin() {
        let mut source = CompositeSource::new();
        source.add_source(HashMapSource::from_iter(
            [("DD_SERVICE", "test-service"), ("DD_ENV", "test-env")],
            ConfigSourceOrigin::EnvVar,
        ));

        for (key, expected) in [
            (
                ConfigurationKey::DD_SERVICE,
                Some(ConfigKey {
                    value: "test-service".to_string(),
                    origin: ConfigSourceOrigin::EnvVar,
                }),
            ),
            (
                ConfigurationKey::DD_ENV,
                Some(ConfigKey {
                    value: "test-env".to_string(),
                    origin: ConfigSourceOrigin::EnvVar,
                }),
            ),
            (ConfigurationKey::DD_VERSION, None),
        ] {
            let result = source.get(key);
            assert_eq!(result.value, expected, "Failed for key: {:?}", key.as_str());
            assert_eq!(result.errors, vec![]);
        }
    }

    #[test]
    fn test_composite_priority_order() {
        let mut source = CompositeSource::new();
        source.add_source(HashMapSource::from_iter(
            [("DD_SERVICE", "from-code")],
            ConfigSourceOrigin::Code,
        ));
        source.add_source(HashMapSource::from_iter(
            [("DD_SERVICE", "from-env"), ("DD_ENV", "prod")],
            ConfigSourceOrigin::EnvVar,
        ));

        let result = source.get(ConfigurationKey::DD_SERVICE);
        assert_eq!(
            result.value,
            Some(ConfigKey {
                value: "from-code".to_string(),
                origin: ConfigSourceOrigin::Code,
            })
        );

        let result = source.get(ConfigurationKey::DD_ENV);
        assert_eq!(
            result.value,
            Some(ConfigKey {
                value: "prod".to_string(),
                origin: ConfigSourceOrigin::EnvVar,
            })
        );
    }

    #[test]
    fn test_composite_parse_error_collection() {
        let mut source = CompositeSource::new();
        source.add_source(HashMapSource::from_iter(
            [("DD_TRACE_RATE_LIMIT", "not-a-number")],
            ConfigSourceOrigin::Code,
        ));
        source.add_source(HashMapSource::from_iter(
            [("DD_TRACE_RATE_LIMIT", "42")],
            ConfigSourceOrigin::EnvVar,
        ));

        let result: CompositeConfigSourceResult<i32> =
            source.get_parse(ConfigurationKey::DD_TRACE_RATE_LIMIT);
        assert_eq!(
            result.value,
            Some(ConfigKey {
                value: 42,
                origin: ConfigSourceOrigin::EnvVar,
            })
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].origin, ConfigSourceOrigin::Code);
    }
}
