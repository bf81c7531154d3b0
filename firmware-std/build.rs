fn main() {
    embuild::espidf::sysenv_output();
}
