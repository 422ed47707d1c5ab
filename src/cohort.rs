use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Trial links for one gene symbol, processed as one batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneCohort {
    pub gene: String,
    /// Used in output file names; defaults to `gene`.
    #[serde(default)]
    pub short_name: Option<String>,
    pub links: Vec<String>,
}

impl GeneCohort {
    pub fn short_name(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.gene)
    }
}

#[derive(Deserialize)]
struct CohortFile {
    #[serde(default)]
    cohort: Vec<GeneCohort>,
}

pub fn load(path: &Path) -> Result<Vec<GeneCohort>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cohort file {:?}", path))?;
    parse(&text).with_context(|| format!("Invalid cohort file {:?}", path))
}

pub fn parse(text: &str) -> Result<Vec<GeneCohort>> {
    let file: CohortFile = toml::from_str(text)?;
    for c in &file.cohort {
        if c.gene.trim().is_empty() {
            bail!("cohort with empty gene symbol");
        }
    }
    Ok(file.cohort)
}

/// Keep cohorts whose gene or short name matches one of `genes`
/// (case-insensitive), in file order. An empty selection keeps everything.
pub fn select(cohorts: Vec<GeneCohort>, genes: &[String]) -> Result<Vec<GeneCohort>> {
    if genes.is_empty() {
        return Ok(cohorts);
    }
    for wanted in genes {
        let known = cohorts.iter().any(|c| {
            c.gene.eq_ignore_ascii_case(wanted) || c.short_name().eq_ignore_ascii_case(wanted)
        });
        if !known {
            bail!("no cohort for gene {:?}", wanted);
        }
    }
    Ok(cohorts
        .into_iter()
        .filter(|c| {
            genes.iter().any(|g| {
                c.gene.eq_ignore_ascii_case(g) || c.short_name().eq_ignore_ascii_case(g)
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[cohort]]
gene = "ALK"
links = [
    "https://clinicaltrials.gov/study/NCT01838577",
    "https://clinicaltrials.gov/study/NCT01752400",
]

[[cohort]]
gene = "ERBB2"
short_name = "HER2"
links = []
"#;

    #[test]
    fn parses_cohorts_in_order() {
        let cohorts = parse(SAMPLE).unwrap();
        assert_eq!(cohorts.len(), 2);
        assert_eq!(cohorts[0].gene, "ALK");
        assert_eq!(cohorts[0].short_name(), "ALK");
        assert_eq!(cohorts[0].links.len(), 2);
        assert_eq!(cohorts[1].short_name(), "HER2");
        assert!(cohorts[1].links.is_empty());
    }

    #[test]
    fn select_by_gene_or_short_name() {
        let cohorts = parse(SAMPLE).unwrap();
        let picked = select(cohorts.clone(), &["her2".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].gene, "ERBB2");
        assert_eq!(select(cohorts.clone(), &[]).unwrap().len(), 2);
        assert!(select(cohorts, &["KIT".to_string()]).is_err());
    }

    #[test]
    fn empty_gene_rejected() {
        assert!(parse("[[cohort]]\ngene = \" \"\nlinks = []\n").is_err());
    }

    #[test]
    fn shipped_cohorts_load() {
        let cohorts = load(Path::new("data/cohorts.toml")).unwrap();
        let genes: Vec<&str> = cohorts.iter().map(|c| c.gene.as_str()).collect();
        assert_eq!(genes, vec!["ALK", "BRAF", "EGFR", "ERBB2", "KIT", "KRAS"]);
        assert!(cohorts.iter().all(|c| !c.links.is_empty()));
    }
}
