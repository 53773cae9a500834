macro_rules! register_metrics {
    (
        $(
            $module:ident => $metric_type:ident
        ),* $(,)?
    ) => {
        // Import all metric modules
        $(
            pub mod $module;
            pub use $module::$metric_type;
        )*

        /// Factories for every built-in metric, in registration order.
        ///
        /// Order matters: `collect_all` visits metrics in the order they are
        /// registered, so this is a `Vec` rather than a map.
        #[must_use]
        pub fn all_factories() -> Vec<(&'static str, fn() -> Box<dyn Metric>)> {
            vec![
                $(
                    (
                        stringify!($module),
                        (|| Box::new($metric_type::new()) as Box<dyn Metric>)
                            as fn() -> Box<dyn Metric>,
                    ),
                )*
            ]
        }

        // Generate array of metric names
        pub const METRIC_NAMES: &[&'static str] = &[
            $(stringify!($module),)*
        ];
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    #[test]
    fn test_all_factories_exist() {
        let factories = crate::metrics::all_factories();

        assert!(!factories.is_empty());
    }

    #[test]
    fn test_metric_names_exist() {
        let names = crate::metrics::METRIC_NAMES;

        assert!(!names.is_empty());
        assert!(names.contains(&"session_overview"));
        assert!(names.contains(&"host_metrics"));
    }

    #[test]
    fn test_factories_match_metric_names_in_order() {
        let factories = crate::metrics::all_factories();
        let keys: Vec<&str> = factories.iter().map(|(name, _)| *name).collect();

        assert_eq!(keys, crate::metrics::METRIC_NAMES);
    }

    #[test]
    fn test_metric_name_matches_key() {
        for (key, factory) in crate::metrics::all_factories() {
            let metric = factory();
            assert_eq!(metric.name(), key);
        }
    }

    #[test]
    fn test_metric_names_are_unique() {
        let names = crate::metrics::METRIC_NAMES;
        let unique: HashSet<&&str> = names.iter().collect();

        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_every_metric_has_labels() {
        for (name, factory) in crate::metrics::all_factories() {
            let metric = factory();
            assert!(
                !metric.display_name().is_empty(),
                "Metric {name} has empty display name"
            );
            assert!(
                !metric.description().is_empty(),
                "Metric {name} has empty description"
            );
        }
    }

    #[test]
    fn test_storage_schema_and_indexes_are_consistent() {
        for (name, factory) in crate::metrics::all_factories() {
            let metric = factory();
            let schema = metric.storage_schema();

            if let Some(schema) = schema {
                assert!(
                    schema.starts_with("CREATE TABLE IF NOT EXISTS"),
                    "Metric '{name}' schema is not idempotent"
                );
            } else {
                assert!(metric.storage_indexes().is_empty());
            }

            for index in metric.storage_indexes() {
                assert!(index.starts_with("CREATE INDEX IF NOT EXISTS"));
            }
        }
    }
}
