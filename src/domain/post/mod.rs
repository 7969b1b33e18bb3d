//! Post domain

mod entity;

pub use entity::{
    parse_tags, LikeAction, MediaFile, NewPost, Post, PostId, SavedPost, UpdatePost,
};
