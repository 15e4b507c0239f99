pub mod assessment; // Granular confidence assessment of extracted sections
