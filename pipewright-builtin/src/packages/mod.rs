use pipewright_catalog::StaticRepository;
use pipewright_types::DeployMode;

mod adios2_pdf_calc;
mod darshan;
mod ior;
mod redis;

pub const BUILTIN_REPO: &str = "builtin";

pub(crate) fn register(repo: StaticRepository) -> StaticRepository {
    repo.register("adios2_pdf_calc", "Adios2PdfCalc", || {
        Box::new(adios2_pdf_calc::Adios2PdfCalc)
    })
    .register("darshan", "Darshan", || Box::new(darshan::Darshan))
    .register("ior", "Ior", || Box::new(ior::Ior))
    .register_delegate("ior", DeployMode::Container, "IorContainer", || {
        Box::new(ior::IorContainer)
    })
    .register("redis", "Redis", || Box::new(redis::Redis))
}
