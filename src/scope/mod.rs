pub mod paths;
pub mod resolver;

pub use paths::{
    is_sibling, is_within, lexical_normalize, normalize, FsProbe, PathComparison, PathProbe,
    StaticProbe,
};
pub use resolver::{ScopeResolver, ScopeSet};
