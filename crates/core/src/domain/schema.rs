use serde::{Deserialize, Serialize};

/// Read-only description of the analytical schema handed to the model by the
/// `get_schema` tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableDescriptor>,
    pub joins: Vec<JoinDescriptor>,
    pub sample_queries: Vec<SampleQuery>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub from: String,
    pub to: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleQuery {
    pub description: String,
    pub sql: String,
}

pub trait SchemaProvider: Send + Sync {
    fn schema(&self) -> &SchemaDescriptor;
}

impl SchemaProvider for SchemaDescriptor {
    fn schema(&self) -> &SchemaDescriptor {
        self
    }
}

impl SchemaDescriptor {
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }

    /// The municipal star schema plus the government dataset tables.
    pub fn analytics() -> Self {
        Self {
            tables: vec![
                table(
                    "fact_measure",
                    "Main fact table containing all measurements",
                    &[
                        ("id", "bigint", "Primary key"),
                        ("indicator_id", "int", "Foreign key to dim_indicator"),
                        ("geo_id", "int", "Foreign key to dim_geo"),
                        ("time_id", "int", "Foreign key to dim_time"),
                        ("value", "numeric", "The measured value"),
                        ("quality_flag", "text", "Data quality indicator"),
                    ],
                ),
                table(
                    "extended_fact_measure",
                    "Extended fact table containing government dataset measurements",
                    &[
                        ("id", "bigint", "Primary key"),
                        ("dataset_id", "int", "Foreign key to dataset_registry"),
                        ("indicator_id", "int", "Foreign key to dataset_indicator"),
                        ("geo_id", "int", "Geographic location reference"),
                        ("time_id", "int", "Time period reference"),
                        ("numeric_value", "numeric", "Numeric measurement value"),
                        ("text_value", "text", "Text measurement value"),
                        ("quality_flag", "text", "Data quality indicator"),
                        ("ingestion_timestamp", "date", "When data was ingested"),
                    ],
                ),
                table(
                    "dataset_registry",
                    "Registry of all available government datasets",
                    &[
                        ("id", "int", "Primary key"),
                        ("slug", "text", "Unique dataset identifier"),
                        ("title", "text", "Dataset title"),
                        (
                            "category",
                            "text",
                            "Dataset category (Economic, Infrastructure, Social, Environmental)",
                        ),
                        ("geographic_level", "text", "Geographic scope (National, State, District)"),
                        ("time_granularity", "text", "Time granularity (Annual, Monthly, Quarterly)"),
                        ("source_department", "text", "Source government department"),
                        ("is_active", "boolean", "Whether the dataset is currently published"),
                    ],
                ),
                table(
                    "dataset_indicator",
                    "Indicators/fields available in each dataset",
                    &[
                        ("id", "int", "Primary key"),
                        ("dataset_id", "int", "Foreign key to dataset_registry"),
                        ("field_name", "text", "Original field name in dataset"),
                        ("display_name", "text", "Human-readable display name"),
                        ("data_type", "text", "Data type (numeric, text, date)"),
                        ("unit", "text", "Unit of measurement"),
                        ("description", "text", "Field description"),
                        ("is_measure", "boolean", "Whether this is a measurable value"),
                    ],
                ),
                table(
                    "dim_time",
                    "Time dimension table",
                    &[
                        ("id", "int", "Primary key"),
                        ("date", "date", "Full date"),
                        ("year", "int", "Year"),
                        ("quarter", "int", "Quarter (1-4)"),
                        ("month", "int", "Month (1-12)"),
                    ],
                ),
                table(
                    "dim_geo",
                    "Geography dimension table",
                    &[
                        ("id", "int", "Primary key"),
                        ("state", "text", "State name"),
                        ("district", "text", "District name"),
                        ("zone", "text", "Zone name"),
                        ("ward", "text", "Ward name"),
                        ("level", "text", "Geographic level (state/district/zone/ward)"),
                    ],
                ),
                table(
                    "dim_indicator",
                    "Indicator dimension table",
                    &[
                        ("id", "int", "Primary key"),
                        ("slug", "text", "Unique identifier slug"),
                        ("title", "text", "Human-readable title"),
                        ("unit", "text", "Unit of measurement"),
                        ("category", "text", "Indicator category"),
                        ("description", "text", "Detailed description"),
                        ("default_agg", "text", "Default aggregation (SUM/AVG/MAX/MIN)"),
                    ],
                ),
            ],
            joins: vec![
                join("fact_measure.indicator_id", "dim_indicator.id", "Link measurements to indicators"),
                join("fact_measure.time_id", "dim_time.id", "Link measurements to time periods"),
                join(
                    "fact_measure.geo_id",
                    "dim_geo.id",
                    "Link measurements to geographic locations",
                ),
                join(
                    "extended_fact_measure.dataset_id",
                    "dataset_registry.id",
                    "Link government dataset measurements to datasets",
                ),
                join(
                    "extended_fact_measure.indicator_id",
                    "dataset_indicator.id",
                    "Link government dataset measurements to indicators",
                ),
                join(
                    "dataset_indicator.dataset_id",
                    "dataset_registry.id",
                    "Link indicators to their datasets",
                ),
            ],
            sample_queries: vec![
                SampleQuery {
                    description: "Get all forest cover data for a specific district".to_string(),
                    sql: "SELECT i.title AS indicator, g.district, t.year, f.value, i.unit \
                          FROM fact_measure f \
                          JOIN dim_indicator i ON f.indicator_id = i.id \
                          JOIN dim_geo g ON f.geo_id = g.id \
                          JOIN dim_time t ON f.time_id = t.id \
                          WHERE i.slug = 'forest_cover_area' AND g.district = 'Ranchi' \
                          ORDER BY t.year"
                        .to_string(),
                },
                SampleQuery {
                    description: "Get GDP data from government datasets".to_string(),
                    sql: "SELECT dr.title AS dataset, di.display_name AS indicator, \
                          efm.numeric_value AS value, di.unit, efm.ingestion_timestamp \
                          FROM extended_fact_measure efm \
                          JOIN dataset_registry dr ON efm.dataset_id = dr.id \
                          JOIN dataset_indicator di ON efm.indicator_id = di.id \
                          WHERE dr.category = 'Economic' AND di.display_name LIKE '%GDP%' \
                          ORDER BY efm.ingestion_timestamp DESC LIMIT 50"
                        .to_string(),
                },
                SampleQuery {
                    description: "List all available government datasets".to_string(),
                    sql: "SELECT dr.title, dr.category, dr.geographic_level, dr.time_granularity, \
                          dr.source_department, COUNT(DISTINCT di.id) AS indicator_count \
                          FROM dataset_registry dr \
                          LEFT JOIN dataset_indicator di ON dr.id = di.dataset_id \
                          WHERE dr.is_active = 1 \
                          GROUP BY dr.id, dr.title, dr.category, dr.geographic_level, \
                          dr.time_granularity, dr.source_department \
                          ORDER BY dr.category, dr.title LIMIT 50"
                        .to_string(),
                },
            ],
        }
    }
}

fn table(name: &str, description: &str, columns: &[(&str, &str, &str)]) -> TableDescriptor {
    TableDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        columns: columns
            .iter()
            .map(|(name, data_type, description)| ColumnDescriptor {
                name: name.to_string(),
                data_type: data_type.to_string(),
                description: description.to_string(),
            })
            .collect(),
    }
}

fn join(from: &str, to: &str, description: &str) -> JoinDescriptor {
    JoinDescriptor { from: from.to_string(), to: to.to_string(), description: description.to_string() }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::SchemaDescriptor;
    use crate::guard::{SqlGuard, READABLE_TABLES};

    #[test]
    fn published_tables_match_the_guard_allow_list() {
        let schema = SchemaDescriptor::analytics();
        let published = schema.table_names().collect::<BTreeSet<_>>();
        let readable = READABLE_TABLES.iter().copied().collect::<BTreeSet<_>>();

        assert_eq!(published, readable);
    }

    #[test]
    fn sample_queries_pass_the_guard() {
        let guard = SqlGuard::default();
        for sample in SchemaDescriptor::analytics().sample_queries {
            assert!(guard.validate(&sample.sql).is_ok(), "{}", sample.description);
        }
    }

    #[test]
    fn joins_reference_published_tables() {
        let schema = SchemaDescriptor::analytics();
        let published = schema.table_names().collect::<BTreeSet<_>>();
        for join in &schema.joins {
            for side in [&join.from, &join.to] {
                let table = side.split('.').next().unwrap_or_default();
                assert!(published.contains(table), "{side}");
            }
        }
    }

    #[test]
    fn column_type_serializes_as_type() {
        let value = serde_json::to_value(SchemaDescriptor::analytics()).expect("serializable");
        assert_eq!(value["tables"][0]["columns"][0]["type"], "bigint");
        assert_eq!(value["joins"][0]["from"], "fact_measure.indicator_id");
    }
}
