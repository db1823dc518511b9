mod env;
mod logging;
