mod context;
mod test_scanner;
