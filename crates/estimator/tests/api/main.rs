mod estimate;
mod helpers;
mod sites;
