//! Reference data: the country list and the upstream source directory.

use crate::db::{CountryChange, Repository};
use crate::error::Result;
use crate::models::NewSource;
use crate::newsapi::SourceCatalog;

/// Countries the upstream API publishes sources for, by ISO code.
pub const COUNTRIES: &[(&str, &str)] = &[
    ("ae", "United Arab Emirates"),
    ("ar", "Argentina"),
    ("at", "Austria"),
    ("au", "Australia"),
    ("be", "Belgium"),
    ("bg", "Bulgaria"),
    ("br", "Brazil"),
    ("ca", "Canada"),
    ("ch", "Switzerland"),
    ("cn", "China"),
    ("co", "Colombia"),
    ("cu", "Cuba"),
    ("cz", "Czechia"),
    ("de", "Germany"),
    ("eg", "Egypt"),
    ("fr", "France"),
    ("gb", "United Kingdom"),
    ("gr", "Greece"),
    ("hk", "Hong Kong"),
    ("hu", "Hungary"),
    ("id", "Indonesia"),
    ("ie", "Ireland"),
    ("il", "Israel"),
    ("in", "India"),
    ("it", "Italy"),
    ("jp", "Japan"),
    ("kr", "South Korea"),
    ("lt", "Lithuania"),
    ("lv", "Latvia"),
    ("ma", "Morocco"),
    ("mx", "Mexico"),
    ("my", "Malaysia"),
    ("ng", "Nigeria"),
    ("nl", "Netherlands"),
    ("no", "Norway"),
    ("nz", "New Zealand"),
    ("ph", "Philippines"),
    ("pl", "Poland"),
    ("pt", "Portugal"),
    ("ro", "Romania"),
    ("rs", "Serbia"),
    ("ru", "Russia"),
    ("sa", "Saudi Arabia"),
    ("se", "Sweden"),
    ("sg", "Singapore"),
    ("si", "Slovenia"),
    ("sk", "Slovakia"),
    ("th", "Thailand"),
    ("tr", "Turkey"),
    ("tw", "Taiwan"),
    ("ua", "Ukraine"),
    ("us", "United States"),
    ("ve", "Venezuela"),
    ("za", "South Africa"),
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub renamed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub countries: usize,
    pub created: usize,
    pub updated: usize,
    pub failed_countries: usize,
}

/// Insert every known country, renaming rows whose name drifted. Safe to run
/// repeatedly.
pub async fn seed_countries(repo: &Repository) -> Result<SeedReport> {
    tracing::info!("Populating {} countries", COUNTRIES.len());

    let mut report = SeedReport::default();
    for (code, name) in COUNTRIES {
        match repo.upsert_country(code, name).await {
            Ok(CountryChange::Created) => report.created += 1,
            Ok(CountryChange::Renamed) => {
                tracing::info!("Renamed country {} to {}", code.to_uppercase(), name);
                report.renamed += 1;
            }
            Ok(CountryChange::Unchanged) => {
                tracing::debug!("Skipped (already exists): {} ({})", name, code.to_uppercase());
                report.unchanged += 1;
            }
            Err(e) => {
                tracing::error!("Failed to save country {}: {}", code.to_uppercase(), e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Finished populating countries. Added: {}, renamed: {}, unchanged: {}",
        report.created,
        report.renamed,
        report.unchanged
    );
    Ok(report)
}

/// Refresh the source table from the upstream directory, one request per
/// stored country. A failing country is logged and skipped.
pub async fn sync_sources<C>(repo: &Repository, catalog: &C) -> Result<SyncReport>
where
    C: SourceCatalog + ?Sized,
{
    let countries = repo.get_all_countries().await?;
    if countries.is_empty() {
        tracing::warn!("No countries found in the database. Run seed-countries first.");
        return Ok(SyncReport::default());
    }

    let mut report = SyncReport {
        countries: countries.len(),
        ..SyncReport::default()
    };

    for country in countries {
        let listings = match catalog.sources_for_country(&country.iso_code).await {
            Ok(listings) => listings,
            Err(e) => {
                tracing::error!("Source request failed for country {}: {}", country.iso_code, e);
                report.failed_countries += 1;
                continue;
            }
        };
        tracing::debug!("Country {}: {} sources listed", country.iso_code, listings.len());

        for listing in listings {
            let Some(external_id) = listing.id.filter(|id| !id.is_empty()) else {
                continue;
            };
            let source = NewSource {
                name: listing.name,
                description: listing.description,
                url: listing.url,
                category: listing.category,
                language: listing.language,
                country_code: listing.country,
                country_id: Some(country.id),
                external_id,
            };
            let external_id = source.external_id.clone();
            match repo.upsert_source(source).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => tracing::error!("Could not save source {}: {}", external_id, e),
            }
        }
    }

    tracing::info!(
        "Finished populating sources. Added: {}, updated: {}, failed countries: {}",
        report.created,
        report.updated,
        report.failed_countries
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::newsapi::SourceListing;

    struct FixedCatalog;

    #[async_trait]
    impl SourceCatalog for FixedCatalog {
        async fn sources_for_country(&self, iso_code: &str) -> Result<Vec<SourceListing>> {
            match iso_code {
                "gb" => Ok(vec![
                    listing(Some("bbc-news"), "BBC News"),
                    listing(None, "No id"),
                ]),
                "us" => Ok(vec![listing(Some("cnn"), "CNN")]),
                _ => Err(AppError::NewsApi("rateLimited".into())),
            }
        }
    }

    fn listing(id: Option<&str>, name: &str) -> SourceListing {
        SourceListing {
            id: id.map(String::from),
            name: name.to_string(),
            description: None,
            url: None,
            category: Some("general".into()),
            language: Some("en".into()),
            country: None,
        }
    }

    #[test]
    fn country_codes_are_unique_lowercase_pairs() {
        let mut codes: Vec<_> = COUNTRIES.iter().map(|(code, _)| *code).collect();
        assert!(codes
            .iter()
            .all(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_lowercase())));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), COUNTRIES.len());
    }

    #[tokio::test]
    async fn seeding_is_idempotent_and_repairs_names() {
        let repo = Repository::in_memory().await.unwrap();
        repo.upsert_country("nz", "Aotearoa").await.unwrap();

        let first = seed_countries(&repo).await.unwrap();
        assert_eq!(first.created, COUNTRIES.len() - 1);
        assert_eq!(first.renamed, 1);

        let second = seed_countries(&repo).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, COUNTRIES.len());

        let nz = repo.get_country_by_code("NZ").await.unwrap().unwrap();
        assert_eq!(nz.name, "New Zealand");
    }

    #[tokio::test]
    async fn sync_skips_failing_countries_and_unidentified_sources() {
        let repo = Repository::in_memory().await.unwrap();
        for (code, name) in [("gb", "United Kingdom"), ("us", "United States"), ("fr", "France")] {
            repo.upsert_country(code, name).await.unwrap();
        }

        let report = sync_sources(&repo, &FixedCatalog).await.unwrap();
        assert_eq!(report.countries, 3);
        assert_eq!(report.created, 2);
        assert_eq!(report.failed_countries, 1);
        assert_eq!(repo.count_sources().await.unwrap(), 2);

        let again = sync_sources(&repo, &FixedCatalog).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.updated, 2);
        assert_eq!(repo.count_sources().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sync_without_countries_is_a_no_op() {
        let repo = Repository::in_memory().await.unwrap();
        let report = sync_sources(&repo, &FixedCatalog).await.unwrap();
        assert_eq!(report, SyncReport::default());
    }
}
