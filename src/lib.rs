pub mod auth;
pub mod config;
pub mod error;
pub mod state;

pub mod db {
    pub mod filter;
    pub mod memory;
    pub mod models;
    pub mod repository;
}

pub mod models {
    pub mod schema;
}

pub mod records {
    pub mod service;
}

pub mod api {
    pub mod errors;
    pub mod records;
    pub mod stats;
    pub mod token;
}
