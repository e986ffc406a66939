mod canonical;
mod grad;
mod normalize;
mod ops;
mod vectorize;
