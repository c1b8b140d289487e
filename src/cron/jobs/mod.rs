pub mod refresh_token_market;
