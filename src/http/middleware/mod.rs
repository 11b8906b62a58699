pub mod cache_page;
