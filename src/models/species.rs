use serde::Serialize;

/// One distinct species and how many visible records name it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SpeciesSummary {
    pub scientific_name: String,
    pub common_name: Option<String>,
    pub observation_count: u64,
}

#[derive(Serialize, Debug)]
pub struct SpeciesList {
    pub count: usize,
    pub results: Vec<SpeciesSummary>,
}
