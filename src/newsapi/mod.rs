mod client;
mod types;

pub use client::{everything_params, ArticleSearch, NewsApiClient, SourceCatalog};
pub use types::{
    parse_published_at, RawArticle, RawSource, Rejection, SearchQuery, SourceListing,
    ValidArticle,
};
