mod article;
mod preference;
mod reference;
mod user;

pub use article::{Article, FeedEntry, NewArticle};
pub use preference::{normalize_keyword, UserPreferences};
pub use reference::{Country, NewSource, Source};
pub use user::{AuthToken, NewUser, RegisteredUser, User, UserId};
