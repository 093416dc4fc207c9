pub mod helpers;
mod tests_put_get;
