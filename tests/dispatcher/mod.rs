mod lifecycle;
mod registration;
