//! Account administration: DTOs and the orchestrating service

pub mod models;
pub mod service;

pub use models::{
    CreateUserRequest, GridRequest, GridResponse, UpdateProfileRequest, UpdateUserRequest,
    UserListQuery, UserListResponse, UserPublic,
};
pub use service::UserService;
