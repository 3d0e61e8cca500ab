//! Adapters for services outside the timetable database

pub mod calendar;
