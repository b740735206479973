pub mod recommendations;

pub use recommendations::{
    paginate, LoadError, Page, PlaylistRecommender, RecommendError, RecommendationEngine,
};
